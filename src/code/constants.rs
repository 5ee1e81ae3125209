use super::RawCode;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Value stored in the constants pool
///
/// Equality (and hashing) is type-aware and stricter than the interpreter's own `==`: `1`, `1.0`
/// and `True` are three different constants, floats are compared by bit pattern (so `0.0` and
/// `-0.0` stay distinct and `nan` is equal to itself), and nested code objects compare by identity.
#[derive(Clone, Debug)]
pub enum Constant {
    None,
    Ellipsis,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex { real: f64, imag: f64 },
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Constant>),
    FrozenSet(Vec<Constant>),
    Code(Rc<RawCode>),
}

impl PartialEq for Constant {
    fn eq(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::None, Constant::None) => true,
            (Constant::Ellipsis, Constant::Ellipsis) => true,
            (Constant::Bool(b1), Constant::Bool(b2)) => b1 == b2,
            (Constant::Int(i1), Constant::Int(i2)) => i1 == i2,
            (Constant::Float(f1), Constant::Float(f2)) => f1.to_bits() == f2.to_bits(),
            (
                Constant::Complex {
                    real: r1,
                    imag: i1,
                },
                Constant::Complex {
                    real: r2,
                    imag: i2,
                },
            ) => r1.to_bits() == r2.to_bits() && i1.to_bits() == i2.to_bits(),
            (Constant::Str(s1), Constant::Str(s2)) => s1 == s2,
            (Constant::Bytes(b1), Constant::Bytes(b2)) => b1 == b2,
            (Constant::Tuple(t1), Constant::Tuple(t2)) => t1 == t2,
            (Constant::FrozenSet(s1), Constant::FrozenSet(s2)) => s1 == s2,
            (Constant::Code(c1), Constant::Code(c2)) => Rc::ptr_eq(c1, c2),
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Constant::None | Constant::Ellipsis => (),
            Constant::Bool(b) => b.hash(state),
            Constant::Int(i) => i.hash(state),
            Constant::Float(f) => f.to_bits().hash(state),
            Constant::Complex { real, imag } => {
                real.to_bits().hash(state);
                imag.to_bits().hash(state);
            }
            Constant::Str(s) => s.hash(state),
            Constant::Bytes(b) => b.hash(state),
            Constant::Tuple(t) => t.hash(state),
            Constant::FrozenSet(s) => s.hash(state),
            Constant::Code(code) => (Rc::as_ptr(code) as usize).hash(state),
        }
    }
}

impl From<i64> for Constant {
    fn from(int: i64) -> Constant {
        Constant::Int(int)
    }
}

impl From<&str> for Constant {
    fn from(string: &str) -> Constant {
        Constant::Str(string.to_owned())
    }
}

impl From<bool> for Constant {
    fn from(boolean: bool) -> Constant {
        Constant::Bool(boolean)
    }
}

fn fmt_float(float: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if float.is_nan() {
        f.write_str("nan")
    } else if float.is_infinite() {
        f.write_str(if float > 0.0 { "inf" } else { "-inf" })
    } else {
        write!(f, "{:?}", float)
    }
}

fn fmt_elements(elements: &[Constant], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, element) in elements.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", element)?;
    }
    Ok(())
}

/// Renders constants the way the interpreter's `repr` would (modulo string quoting details)
impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::None => f.write_str("None"),
            Constant::Ellipsis => f.write_str("Ellipsis"),
            Constant::Bool(true) => f.write_str("True"),
            Constant::Bool(false) => f.write_str("False"),
            Constant::Int(i) => write!(f, "{}", i),
            Constant::Float(float) => fmt_float(*float, f),
            Constant::Complex { real, imag } => {
                f.write_str("(")?;
                fmt_float(*real, f)?;
                if imag.is_sign_negative() {
                    f.write_str("-")?;
                    fmt_float(-*imag, f)?;
                } else {
                    f.write_str("+")?;
                    fmt_float(*imag, f)?;
                }
                f.write_str("j)")
            }
            Constant::Str(s) => write!(f, "{:?}", s),
            Constant::Bytes(bytes) => {
                f.write_str("b'")?;
                for byte in bytes {
                    match *byte {
                        b'\'' => f.write_str("\\'")?,
                        b'\\' => f.write_str("\\\\")?,
                        0x20..=0x7e => write!(f, "{}", *byte as char)?,
                        _ => write!(f, "\\x{:02x}", byte)?,
                    }
                }
                f.write_str("'")
            }
            Constant::Tuple(elements) => {
                f.write_str("(")?;
                fmt_elements(elements, f)?;
                if elements.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Constant::FrozenSet(elements) => {
                f.write_str("frozenset({")?;
                fmt_elements(elements, f)?;
                f.write_str("})")
            }
            Constant::Code(code) => write!(f, "<code object {}>", code.header.name),
        }
    }
}
