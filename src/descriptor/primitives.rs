//! `Describe` impls for std, chrono and serde_json types.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

use super::{cached, Describe, Kind, ScalarKind, TimeKind, TypeDescriptor};
use crate::meta::Meta;

macro_rules! describe_scalar {
    ($($ty:ty => $name:literal, $kind:expr;)*) => {
        $(
            impl Describe for $ty {
                fn descriptor() -> &'static TypeDescriptor {
                    cached::<Self>(|| TypeDescriptor::new::<Self>($name, Kind::Scalar($kind)))
                }
            }
        )*
    };
}

describe_scalar! {
    bool => "bool", ScalarKind::Bool;
    i8 => "i8", ScalarKind::Int(8);
    i16 => "i16", ScalarKind::Int(16);
    i32 => "i32", ScalarKind::Int(32);
    i64 => "i64", ScalarKind::Int(64);
    isize => "isize", ScalarKind::Int(64);
    u8 => "u8", ScalarKind::Uint(8);
    u16 => "u16", ScalarKind::Uint(16);
    u32 => "u32", ScalarKind::Uint(32);
    u64 => "u64", ScalarKind::Uint(64);
    usize => "usize", ScalarKind::Uint(64);
    f32 => "f32", ScalarKind::Float(32);
    f64 => "f64", ScalarKind::Float(64);
    char => "char", ScalarKind::Char;
    String => "String", ScalarKind::String;
}

impl Describe for serde_json::Value {
    fn descriptor() -> &'static TypeDescriptor {
        cached::<Self>(|| TypeDescriptor::new::<Self>("Value", Kind::Any))
    }
}

impl Describe for () {
    fn descriptor() -> &'static TypeDescriptor {
        cached::<Self>(|| TypeDescriptor::new::<Self>("()", Kind::Any))
    }
}

impl Describe for Meta {
    fn descriptor() -> &'static TypeDescriptor {
        cached::<Self>(|| TypeDescriptor::new::<Self>("Meta", Kind::Marker))
    }
}

impl<Tz: chrono::TimeZone + 'static> Describe for chrono::DateTime<Tz> {
    fn descriptor() -> &'static TypeDescriptor {
        cached::<Self>(|| TypeDescriptor::new::<Self>("DateTime", Kind::Time(TimeKind::DateTime)))
    }
}

impl Describe for chrono::NaiveDateTime {
    fn descriptor() -> &'static TypeDescriptor {
        cached::<Self>(|| {
            TypeDescriptor::new::<Self>("NaiveDateTime", Kind::Time(TimeKind::NaiveDateTime))
        })
    }
}

impl Describe for chrono::NaiveDate {
    fn descriptor() -> &'static TypeDescriptor {
        cached::<Self>(|| TypeDescriptor::new::<Self>("NaiveDate", Kind::Time(TimeKind::Date)))
    }
}

impl<T: Describe + 'static> Describe for Option<T> {
    fn descriptor() -> &'static TypeDescriptor {
        cached::<Self>(|| TypeDescriptor::new::<Self>("Option", Kind::Pointer(T::descriptor)))
    }
}

// Owning pointers are transparent: the pointee is always allocated.
impl<T: Describe + 'static> Describe for Box<T> {
    fn descriptor() -> &'static TypeDescriptor {
        T::descriptor()
    }
}

impl<T: Describe + 'static> Describe for Arc<T> {
    fn descriptor() -> &'static TypeDescriptor {
        T::descriptor()
    }
}

impl<T: Describe + 'static> Describe for Rc<T> {
    fn descriptor() -> &'static TypeDescriptor {
        T::descriptor()
    }
}

macro_rules! describe_sequence {
    ($($ty:ident => $name:literal),*) => {
        $(
            impl<T: Describe + 'static> Describe for $ty<T> {
                fn descriptor() -> &'static TypeDescriptor {
                    cached::<Self>(|| TypeDescriptor::new::<Self>($name, Kind::Slice(T::descriptor)))
                }
            }
        )*
    };
}

describe_sequence!(Vec => "Vec", VecDeque => "VecDeque", BTreeSet => "BTreeSet");

impl<T: Describe + 'static, S: 'static> Describe for HashSet<T, S> {
    fn descriptor() -> &'static TypeDescriptor {
        cached::<Self>(|| TypeDescriptor::new::<Self>("HashSet", Kind::Slice(T::descriptor)))
    }
}

impl<T: Describe + 'static, const N: usize> Describe for [T; N] {
    fn descriptor() -> &'static TypeDescriptor {
        cached::<Self>(|| TypeDescriptor::new::<Self>("Array", Kind::Slice(T::descriptor)))
    }
}

impl<K: Describe + 'static, V: Describe + 'static, S: 'static> Describe for HashMap<K, V, S> {
    fn descriptor() -> &'static TypeDescriptor {
        cached::<Self>(|| {
            TypeDescriptor::new::<Self>(
                "HashMap",
                Kind::Map {
                    key: K::descriptor,
                    value: V::descriptor,
                },
            )
        })
    }
}

impl<K: Describe + 'static, V: Describe + 'static> Describe for BTreeMap<K, V> {
    fn descriptor() -> &'static TypeDescriptor {
        cached::<Self>(|| {
            TypeDescriptor::new::<Self>(
                "BTreeMap",
                Kind::Map {
                    key: K::descriptor,
                    value: V::descriptor,
                },
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptors_are_memoized() {
        let a = <Vec<String> as Describe>::descriptor();
        let b = <Vec<String> as Describe>::descriptor();
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn test_box_is_transparent() {
        let boxed = <Box<i64> as Describe>::descriptor();
        assert!(std::ptr::eq(boxed, <i64 as Describe>::descriptor()));
    }

    #[test]
    fn test_option_derefs_to_pointee() {
        let desc = <Option<Option<u32>> as Describe>::descriptor();
        assert!(matches!(desc.kind, Kind::Pointer(_)));
        assert!(std::ptr::eq(desc.deref(), <u32 as Describe>::descriptor()));
    }

    #[test]
    fn test_map_records_key_and_value() {
        let desc = <HashMap<String, f64> as Describe>::descriptor();
        match desc.kind {
            Kind::Map { key, value } => {
                assert_eq!(key().kind_name(), "string");
                assert_eq!(value().kind_name(), "number");
            }
            _ => panic!("expected map kind"),
        }
    }

    #[test]
    fn test_time_kinds() {
        assert_eq!(
            <chrono::DateTime<chrono::Utc> as Describe>::descriptor().kind_name(),
            "date-time"
        );
        assert_eq!(<chrono::NaiveDate as Describe>::descriptor().kind_name(), "date");
    }
}
