//! Serialization of typed values into buffer bytes.
//!
//! Fixed size elements are written in native byte order, as their in-memory representation.
//! A string is written as its length as a little-endian `u64` followed by its UTF-8 bytes.

use std::borrow::Cow;

use crate::variable::ElementType;

/// A trait representing a variable element type.
pub trait Element: Sized {
    /// The element type of a variable that accepts this element.
    const ELEMENT_TYPE: ElementType;

    /// Serialize `elements`.
    fn to_bytes(elements: &[Self]) -> Cow<'_, [u8]>;
}

/// Helper macro to implement `Element` for POD (plain old data) types.
macro_rules! impl_element_pod {
    ($raw_type:ty, $element_type:expr) => {
        impl Element for $raw_type {
            const ELEMENT_TYPE: ElementType = $element_type;

            fn to_bytes(elements: &[Self]) -> Cow<'_, [u8]> {
                Cow::Borrowed(bytemuck::must_cast_slice(elements))
            }
        }
    };
}

impl_element_pod!(i8, ElementType::Int8);
impl_element_pod!(i16, ElementType::Int16);
impl_element_pod!(i32, ElementType::Int32);
impl_element_pod!(i64, ElementType::Int64);
impl_element_pod!(u8, ElementType::UInt8);
impl_element_pod!(u16, ElementType::UInt16);
impl_element_pod!(u32, ElementType::UInt32);
impl_element_pod!(u64, ElementType::UInt64);
impl_element_pod!(f32, ElementType::Float32);
impl_element_pod!(f64, ElementType::Float64);

macro_rules! impl_element_string {
    ($raw_type:ty) => {
        impl Element for $raw_type {
            const ELEMENT_TYPE: ElementType = ElementType::String;

            fn to_bytes(elements: &[Self]) -> Cow<'_, [u8]> {
                let len = elements
                    .iter()
                    .map(|element| element.len() + size_of::<u64>())
                    .sum();
                let mut bytes = Vec::with_capacity(len);
                for element in elements {
                    bytes.extend_from_slice(&(element.len() as u64).to_le_bytes());
                    bytes.extend_from_slice(element.as_bytes());
                }
                Cow::Owned(bytes)
            }
        }
    };
}

impl_element_string!(&str);
impl_element_string!(String);
