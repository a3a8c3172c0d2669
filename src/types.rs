//! Canonical type representation for the An language.
//!
//! `Ty` is attached to every AST type annotation and to every lowered value
//! (`TypedValue` pairs a `Ty` with the LLVM value it describes). Equality on
//! `Ty` is *nominal*: tag, name, and children must all agree, so two record
//! types with identical layout but different names compare unequal.
//! Structural equivalence is a separate operation performed on the lowered
//! LLVM types, which the context interns (see `Compiler::ty_to_llvm`).

use std::fmt;

/// A type of the An source tongue.
///
/// Composite variants own their children; there are no sibling links.
/// `Data`/`Union` carry only the declared name, the instance layout lives in
/// the user-type registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ty {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    /// Pointer-sized signed integer.
    Isz,
    /// Pointer-sized unsigned integer.
    Usz,
    F16,
    F32,
    F64,
    /// 8-bit character.
    C8,
    Bool,
    /// The unit (void) type, produced by the empty tuple.
    Unit,
    Ptr(Box<Ty>),
    /// Arrays decay to a pointer to their first element when lowered.
    Array(Box<Ty>),
    Tuple(Vec<Ty>),
    /// A user-declared record type, by name.
    Data(String),
    /// A tagged union, by the parent union's name.
    Union(String),
    Func { ret: Box<Ty>, params: Vec<Ty> },
    /// A function with a bound receiver; same shape as `Func`.
    Method { ret: Box<Ty>, params: Vec<Ty> },
}

impl Ty {
    pub fn ptr_to(inner: Ty) -> Ty {
        Ty::Ptr(Box::new(inner))
    }

    pub fn is_int(&self) -> bool {
        matches!(
            self,
            Ty::I8
                | Ty::I16
                | Ty::I32
                | Ty::I64
                | Ty::U8
                | Ty::U16
                | Ty::U32
                | Ty::U64
                | Ty::Isz
                | Ty::Usz
                | Ty::C8
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Ty::F16 | Ty::F32 | Ty::F64)
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Ty::U8 | Ty::U16 | Ty::U32 | Ty::U64 | Ty::Usz)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_int() || self.is_float()
    }

    /// Natural width of a primitive tag in bits. Composite and named types
    /// are sized by `Compiler::size_in_bits`, which can consult the
    /// user-type registry.
    pub fn primitive_width(&self) -> u32 {
        match self {
            Ty::I8 | Ty::U8 | Ty::C8 | Ty::Bool => 8,
            Ty::I16 | Ty::U16 | Ty::F16 => 16,
            Ty::I32 | Ty::U32 | Ty::F32 => 32,
            Ty::I64 | Ty::U64 | Ty::Isz | Ty::Usz | Ty::F64 => 64,
            _ => 0,
        }
    }

    /// Numeric rank used by implicit widening: wider wins, floats outrank
    /// every integer.
    pub fn widen_rank(&self) -> u32 {
        let base = if self.is_float() { 1000 } else { 0 };
        base + self.primitive_width()
    }
}

/// Mangles a function name with its parameter types. The output feeds LLVM
/// symbol names directly, so it must stay flat and deterministic:
/// `name_p1_p2...` with `Display` supplying each type's repr.
pub fn mangle(base: &str, params: &[Ty]) -> String {
    let mut name = base.to_string();
    for p in params {
        name.push('_');
        name.push_str(&p.to_string());
    }
    name
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::I8 => write!(f, "i8"),
            Ty::I16 => write!(f, "i16"),
            Ty::I32 => write!(f, "i32"),
            Ty::I64 => write!(f, "i64"),
            Ty::U8 => write!(f, "u8"),
            Ty::U16 => write!(f, "u16"),
            Ty::U32 => write!(f, "u32"),
            Ty::U64 => write!(f, "u64"),
            Ty::Isz => write!(f, "isz"),
            Ty::Usz => write!(f, "usz"),
            Ty::F16 => write!(f, "f16"),
            Ty::F32 => write!(f, "f32"),
            Ty::F64 => write!(f, "f64"),
            Ty::C8 => write!(f, "c8"),
            Ty::Bool => write!(f, "bool"),
            Ty::Unit => write!(f, "unit"),
            Ty::Ptr(inner) => write!(f, "{}*", inner),
            Ty::Array(inner) => write!(f, "[{}]", inner),
            Ty::Tuple(elems) => {
                write!(f, "(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            Ty::Data(name) | Ty::Union(name) => write!(f, "{}", name),
            Ty::Func { ret, params } | Ty::Method { ret, params } => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")->{}", ret)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_cover_tags() {
        assert!(Ty::U16.is_int());
        assert!(Ty::U16.is_unsigned());
        assert!(!Ty::I16.is_unsigned());
        assert!(Ty::F32.is_float());
        assert!(Ty::F32.is_numeric());
        assert!(Ty::C8.is_int());
        assert!(!Ty::Bool.is_numeric());
        assert!(!Ty::ptr_to(Ty::I8).is_numeric());
    }

    #[test]
    fn nominal_equality_distinguishes_names() {
        assert_ne!(Ty::Data("Vec2".into()), Ty::Data("Point".into()));
        assert_eq!(Ty::Data("Vec2".into()), Ty::Data("Vec2".into()));
        assert_ne!(Ty::Data("Str".into()), Ty::Union("Str".into()));
    }

    #[test]
    fn mangle_round_trips_when_reprs_have_no_underscore() {
        let mangled = mangle("Sum", &[Ty::I32, Ty::Array(Box::new(Ty::C8))]);
        assert_eq!(mangled, "Sum_i32_[c8]");
        let parts: Vec<&str> = mangled.split('_').collect();
        assert_eq!(parts, vec!["Sum", "i32", "[c8]"]);
    }

    #[test]
    fn display_matches_mangling_grammar() {
        assert_eq!(Ty::ptr_to(Ty::C8).to_string(), "c8*");
        assert_eq!(Ty::Array(Box::new(Ty::C8)).to_string(), "[c8]");
        assert_eq!(Ty::Tuple(vec![Ty::I32, Ty::F64]).to_string(), "(i32,f64)");
        let f = Ty::Func {
            ret: Box::new(Ty::I32),
            params: vec![Ty::I32, Ty::I32],
        };
        assert_eq!(f.to_string(), "(i32,i32)->i32");
    }
}
