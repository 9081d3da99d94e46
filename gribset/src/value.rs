//! Field values and masked data-point arrays.

use core::fmt;

/// Optional explicit decode type for a field read.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum KeyType {
    /// Whatever type the codec stores the key as.
    #[default]
    Native,
    Int,
    Float,
    Str,
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Convert to the requested type. `None` when the value has no sensible
    /// representation in that type (a non-numeric string as an int, ...).
    pub fn convert(self, ty: KeyType) -> Option<Value> {
        match (ty, self) {
            (KeyType::Native, v) => Some(v),
            (KeyType::Int, Value::Int(i)) => Some(Value::Int(i)),
            (KeyType::Int, Value::Float(f)) => {
                (f.fract() == 0.0 && f.is_finite()).then_some(Value::Int(f as i64))
            }
            (KeyType::Int, Value::Str(s)) => s.trim().parse().ok().map(Value::Int),
            (KeyType::Float, Value::Int(i)) => Some(Value::Float(i as f64)),
            (KeyType::Float, Value::Float(f)) => Some(Value::Float(f)),
            (KeyType::Float, Value::Str(s)) => s.trim().parse().ok().map(Value::Float),
            (KeyType::Str, v) => Some(Value::Str(v.to_string())),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a command-line style literal: integers, then floats, else a string.
    pub fn parse_literal(s: &str) -> Value {
        if let Ok(i) = s.parse::<i64>() {
            Value::Int(i)
        } else if let Ok(f) = s.parse::<f64>() {
            Value::Float(f)
        } else {
            Value::Str(s.to_owned())
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// Data points with a parallel mask. Positions are 1:1 with the record's data
/// points; masking never removes entries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaskedArray {
    data: Vec<f64>,
    mask: Vec<bool>,
}

impl MaskedArray {
    /// Unmasked array over `data`.
    pub fn new(data: Vec<f64>) -> Self {
        let mask = vec![false; data.len()];
        Self { data, mask }
    }

    /// Mask every point exactly equal to `sentinel`.
    pub fn masked_values(data: Vec<f64>, sentinel: f64) -> Self {
        let mask = data.iter().map(|v| *v == sentinel).collect();
        Self { data, mask }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub fn is_masked(&self, i: usize) -> bool {
        self.mask.get(i).copied().unwrap_or(false)
    }

    pub fn any_masked(&self) -> bool {
        self.mask.iter().any(|m| *m)
    }

    pub fn masked_count(&self) -> usize {
        self.mask.iter().filter(|m| **m).count()
    }

    /// Mask or unmask position `i`. Out-of-range positions are ignored.
    pub fn set_mask(&mut self, i: usize, masked: bool) {
        if let Some(m) = self.mask.get_mut(i) {
            *m = masked;
        }
    }

    /// Copy of the data with every masked position replaced by `fill`.
    pub fn filled(&self, fill: f64) -> Vec<f64> {
        self.data
            .iter()
            .zip(&self.mask)
            .map(|(v, m)| if *m { fill } else { *v })
            .collect()
    }

    /// Unmasked values, in order.
    pub fn compressed(&self) -> Vec<f64> {
        self.data
            .iter()
            .zip(&self.mask)
            .filter(|(_, m)| !**m)
            .map(|(v, _)| *v)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn masking_keeps_shape() {
        let arr = MaskedArray::masked_values(vec![1.0, 9999.0, 3.0, 9999.0], 9999.0);
        assert_eq!(arr.len(), 4);
        assert_eq!(arr.mask(), &[false, true, false, true]);
        assert_eq!(arr.compressed(), vec![1.0, 3.0]);
        assert_eq!(arr.filled(-1.0), vec![1.0, -1.0, 3.0, -1.0]);
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::Int(925).convert(KeyType::Str), Some(Value::from("925")));
        assert_eq!(Value::from("925").convert(KeyType::Int), Some(Value::Int(925)));
        assert_eq!(Value::from("t").convert(KeyType::Int), None);
        assert_eq!(Value::Float(2.5).convert(KeyType::Int), None);
        assert_eq!(Value::Int(3).convert(KeyType::Float), Some(Value::Float(3.0)));
    }

    #[test]
    fn literals() {
        assert_eq!(Value::parse_literal("925"), Value::Int(925));
        assert_eq!(Value::parse_literal("0.5"), Value::Float(0.5));
        assert_eq!(Value::parse_literal("t"), Value::from("t"));
    }
}
