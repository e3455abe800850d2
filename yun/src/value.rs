// Copyright 2026 the Yun Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The tagged value model.
//!
//! A [`Value`] is a `(tag, payload)` pair: the payload is always 64 bits wide
//! and is reinterpreted according to the tag. All arithmetic, comparison,
//! conversion, and bit operations validate their operand tags and fail with a
//! [`TypeError`] on mismatch; integer division and remainder by zero fail with
//! an [`ArithmeticError`]. Integer arithmetic wraps, so no host-level
//! undefined behavior can leak through the instruction set.

use core::fmt;

/// A type tag.
///
/// `Uninit` is the state of a freshly allocated register. The numeric codes
/// (`Int8` = 1 through `Float64` = 10) double as the element-type ids accepted
/// by `newarray`.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// Default tag of a fresh register.
    Uninit = 0,
    /// `i8`.
    Int8 = 1,
    /// `i16`.
    Int16 = 2,
    /// `i32`.
    Int32 = 3,
    /// `i64`.
    Int64 = 4,
    /// `u8`.
    Uint8 = 5,
    /// `u16`.
    Uint16 = 6,
    /// `u32`.
    Uint32 = 7,
    /// `u64`.
    Uint64 = 8,
    /// `f32`.
    Float32 = 9,
    /// `f64`.
    Float64 = 10,
    /// A heap array reference.
    Reference = 11,
}

impl Type {
    /// Parses a tag from its byte code.
    #[must_use]
    pub fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Uninit,
            1 => Self::Int8,
            2 => Self::Int16,
            3 => Self::Int32,
            4 => Self::Int64,
            5 => Self::Uint8,
            6 => Self::Uint16,
            7 => Self::Uint32,
            8 => Self::Uint64,
            9 => Self::Float32,
            10 => Self::Float64,
            11 => Self::Reference,
            _ => return None,
        })
    }

    /// Returns the display name of the tag.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uninit => "<uninit>",
            Self::Int8 => "Int8",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::Uint8 => "Uint8",
            Self::Uint16 => "Uint16",
            Self::Uint32 => "Uint32",
            Self::Uint64 => "Uint64",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
            Self::Reference => "Reference",
        }
    }

    /// Returns true for the four integral tags operable by `bnot` and the
    /// bitwise/shift instruction families.
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Int32 | Self::Int64 | Self::Uint32 | Self::Uint64
        )
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A reference to an element of a heap array.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    /// Heap slot id.
    pub heap_id: u32,
    /// Element index the reference currently points at.
    pub array_index: u32,
}

/// A type error raised by a [`Value`] operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TypeError {
    /// An operand tag did not match the operation's expected type.
    Expected {
        /// The tag the operation requires.
        expected: Type,
        /// The tag found.
        actual: Type,
    },
    /// Two operands that must share a tag did not.
    Mismatched {
        /// Destination operand tag.
        lhs: Type,
        /// Source operand tag.
        rhs: Type,
    },
    /// A comparison was attempted outside the 32-/64-bit widths of its family.
    NotComparable {
        /// The offending tag.
        actual: Type,
    },
    /// `bnot` on a non-integral tag.
    NotIntegral {
        /// The offending tag.
        actual: Type,
    },
    /// A shift count register did not hold `Uint32`.
    BadShiftCount {
        /// The tag found in the count register.
        actual: Type,
    },
    /// An array element-type id was outside the primitive range.
    BadElementType {
        /// The raw element-type id.
        id: u32,
    },
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expected { expected, actual } => {
                write!(f, "expected {expected}, got {actual}")
            }
            Self::Mismatched { lhs, rhs } => {
                write!(f, "incompatible types {lhs} and {rhs}")
            }
            Self::NotComparable { actual } => {
                write!(f, "{actual} is not comparable in this family")
            }
            Self::NotIntegral { actual } => write!(f, "{actual} is not integral"),
            Self::BadShiftCount { actual } => {
                write!(f, "shift count must be Uint32, got {actual}")
            }
            Self::BadElementType { id } => write!(f, "bad array element type id {id}"),
        }
    }
}

impl core::error::Error for TypeError {}

/// An arithmetic error raised by integer division or remainder.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArithmeticError {
    /// Integer division by zero.
    DivisionByZero,
    /// Integer remainder by zero.
    RemainderByZero,
}

impl fmt::Display for ArithmeticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::RemainderByZero => write!(f, "remainder by zero"),
        }
    }
}

impl core::error::Error for ArithmeticError {}

/// A value operation error: either a tag mismatch or an arithmetic fault.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueError {
    /// Tag validation failed.
    Type(TypeError),
    /// Integer division or remainder by zero.
    Arithmetic(ArithmeticError),
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(e) => write!(f, "{e}"),
            Self::Arithmetic(e) => write!(f, "{e}"),
        }
    }
}

impl core::error::Error for ValueError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Type(e) => Some(e),
            Self::Arithmetic(e) => Some(e),
        }
    }
}

impl From<TypeError> for ValueError {
    fn from(e: TypeError) -> Self {
        Self::Type(e)
    }
}

impl From<ArithmeticError> for ValueError {
    fn from(e: ArithmeticError) -> Self {
        Self::Arithmetic(e)
    }
}

/// A host primitive with a [`Type`] tag and a 64-bit payload encoding.
///
/// Narrow types are zero-extended into the payload, so a given `(tag, bits)`
/// pair has exactly one canonical encoding per constructor path.
pub trait Primitive: Copy + PartialEq {
    /// Tag for this primitive.
    const TAG: Type;

    /// Reinterprets the low bits of the payload.
    fn from_bits(bits: u64) -> Self;

    /// Encodes into a 64-bit payload.
    fn into_bits(self) -> u64;
}

macro_rules! impl_primitive {
    ($($t:ty => $tag:ident, |$b:ident| $from:expr, |$v:ident| $into:expr;)*) => {
        $(impl Primitive for $t {
            const TAG: Type = Type::$tag;

            #[inline]
            fn from_bits(bits: u64) -> Self {
                let $b = bits;
                $from
            }

            #[inline]
            fn into_bits(self) -> u64 {
                let $v = self;
                $into
            }
        })*
    };
}

impl_primitive! {
    i8  => Int8,    |b| b as u8 as i8,            |v| v as u8 as u64;
    i16 => Int16,   |b| b as u16 as i16,          |v| v as u16 as u64;
    i32 => Int32,   |b| b as u32 as i32,          |v| v as u32 as u64;
    i64 => Int64,   |b| b as i64,                 |v| v as u64;
    u8  => Uint8,   |b| b as u8,                  |v| u64::from(v);
    u16 => Uint16,  |b| b as u16,                 |v| u64::from(v);
    u32 => Uint32,  |b| b as u32,                 |v| u64::from(v);
    u64 => Uint64,  |b| b,                        |v| v;
    f32 => Float32, |b| f32::from_bits(b as u32), |v| u64::from(v.to_bits());
    f64 => Float64, |b| f64::from_bits(b),        |v| v.to_bits();
}

/// Arithmetic over a primitive. Integer variants wrap; floats follow IEEE 754.
pub trait Numeric: Primitive {
    /// `self + rhs`.
    fn add(self, rhs: Self) -> Self;
    /// `self - rhs`.
    fn sub(self, rhs: Self) -> Self;
    /// `self * rhs`.
    fn mul(self, rhs: Self) -> Self;
    /// `self / rhs`. Integer division by zero is an error.
    fn div(self, rhs: Self) -> Result<Self, ArithmeticError>;
    /// `self % rhs` for integers, IEEE remainder for floats.
    fn rem(self, rhs: Self) -> Result<Self, ArithmeticError>;
}

macro_rules! impl_numeric_int {
    ($($t:ty),*) => {
        $(impl Numeric for $t {
            #[inline]
            fn add(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }

            #[inline]
            fn sub(self, rhs: Self) -> Self {
                self.wrapping_sub(rhs)
            }

            #[inline]
            fn mul(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }

            #[inline]
            fn div(self, rhs: Self) -> Result<Self, ArithmeticError> {
                if rhs == 0 {
                    return Err(ArithmeticError::DivisionByZero);
                }
                Ok(self.wrapping_div(rhs))
            }

            #[inline]
            fn rem(self, rhs: Self) -> Result<Self, ArithmeticError> {
                if rhs == 0 {
                    return Err(ArithmeticError::RemainderByZero);
                }
                Ok(self.wrapping_rem(rhs))
            }
        })*
    };
}

impl_numeric_int!(i32, i64, u32, u64);

impl Numeric for f32 {
    #[inline]
    fn add(self, rhs: Self) -> Self {
        self + rhs
    }

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self - rhs
    }

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        self * rhs
    }

    #[inline]
    fn div(self, rhs: Self) -> Result<Self, ArithmeticError> {
        Ok(self / rhs)
    }

    #[inline]
    fn rem(self, rhs: Self) -> Result<Self, ArithmeticError> {
        Ok(libm::remainderf(self, rhs))
    }
}

impl Numeric for f64 {
    #[inline]
    fn add(self, rhs: Self) -> Self {
        self + rhs
    }

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self - rhs
    }

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        self * rhs
    }

    #[inline]
    fn div(self, rhs: Self) -> Result<Self, ArithmeticError> {
        Ok(self / rhs)
    }

    #[inline]
    fn rem(self, rhs: Self) -> Result<Self, ArithmeticError> {
        Ok(libm::remainder(self, rhs))
    }
}

/// Bitwise operations over an integral primitive.
///
/// Shift counts are masked to the operand width, so out-of-range counts are
/// defined. Right shift is arithmetic for signed types, logical for unsigned.
pub trait Integral: Numeric {
    /// `self & rhs`.
    fn and(self, rhs: Self) -> Self;
    /// `self | rhs`.
    fn or(self, rhs: Self) -> Self;
    /// `self ^ rhs`.
    fn xor(self, rhs: Self) -> Self;
    /// `self << count`.
    fn shl(self, count: u32) -> Self;
    /// `self >> count`.
    fn shr(self, count: u32) -> Self;
}

macro_rules! impl_integral {
    ($($t:ty),*) => {
        $(impl Integral for $t {
            #[inline]
            fn and(self, rhs: Self) -> Self {
                self & rhs
            }

            #[inline]
            fn or(self, rhs: Self) -> Self {
                self | rhs
            }

            #[inline]
            fn xor(self, rhs: Self) -> Self {
                self ^ rhs
            }

            #[inline]
            fn shl(self, count: u32) -> Self {
                self.wrapping_shl(count)
            }

            #[inline]
            fn shr(self, count: u32) -> Self {
                self.wrapping_shr(count)
            }
        })*
    };
}

impl_integral!(i32, i64, u32, u64);

/// A primitive with a negation, for the `neg` instruction family.
pub trait Negatable: Primitive {
    /// `-self`, wrapping for integers.
    fn negate(self) -> Self;
}

impl Negatable for i32 {
    #[inline]
    fn negate(self) -> Self {
        self.wrapping_neg()
    }
}

impl Negatable for i64 {
    #[inline]
    fn negate(self) -> Self {
        self.wrapping_neg()
    }
}

impl Negatable for f32 {
    #[inline]
    fn negate(self) -> Self {
        -self
    }
}

impl Negatable for f64 {
    #[inline]
    fn negate(self) -> Self {
        -self
    }
}

/// Numeric cast between two primitives (the semantics of Rust `as`).
pub trait CastTo<T: Primitive>: Primitive {
    /// Casts `self` into `T`.
    fn cast(self) -> T;
}

macro_rules! impl_cast_to {
    ($from:ty => $($to:ty),+) => {
        $(impl CastTo<$to> for $from {
            #[inline]
            fn cast(self) -> $to {
                self as $to
            }
        })+
    };
}

impl_cast_to!(i8  => i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
impl_cast_to!(i16 => i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
impl_cast_to!(i32 => i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
impl_cast_to!(i64 => i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
impl_cast_to!(u8  => i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
impl_cast_to!(u16 => i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
impl_cast_to!(u32 => i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
impl_cast_to!(u64 => i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
impl_cast_to!(f32 => i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
impl_cast_to!(f64 => i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

/// A tagged 64-bit value.
///
/// Equality is `(tag, payload)` equality, which is also the constant pool's
/// deduplication key.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Value {
    tag: Type,
    bits: u64,
}

impl Default for Value {
    fn default() -> Self {
        Self::uninit()
    }
}

macro_rules! value_constructors {
    ($($fn_name:ident($t:ty)),* $(,)?) => {
        $(
            #[doc = concat!("Constructs a tagged `", stringify!($t), "` value.")]
            #[must_use]
            pub fn $fn_name(v: $t) -> Self {
                Self {
                    tag: <$t as Primitive>::TAG,
                    bits: v.into_bits(),
                }
            }
        )*
    };
}

impl Value {
    /// Constructs an uninitialized value.
    #[must_use]
    pub const fn uninit() -> Self {
        Self {
            tag: Type::Uninit,
            bits: 0,
        }
    }

    value_constructors! {
        int8(i8), int16(i16), int32(i32), int64(i64),
        uint8(u8), uint16(u16), uint32(u32), uint64(u64),
        float32(f32), float64(f64),
    }

    /// Constructs a reference value.
    #[must_use]
    pub fn reference(r: Reference) -> Self {
        Self {
            tag: Type::Reference,
            bits: u64::from(r.heap_id) | (u64::from(r.array_index) << 32),
        }
    }

    /// Constructs a value from a tag and a raw 64-bit payload.
    ///
    /// This is how array cells are rehydrated: the payload is reinterpreted
    /// according to `tag` without validation.
    #[must_use]
    pub const fn from_raw(tag: Type, bits: u64) -> Self {
        Self { tag, bits }
    }

    /// Returns the type tag.
    #[must_use]
    pub const fn tag(&self) -> Type {
        self.tag
    }

    /// Returns the raw 64-bit payload.
    #[must_use]
    pub const fn raw_bits(&self) -> u64 {
        self.bits
    }

    /// Reads the payload as `T`, failing if the tag does not match.
    pub fn get<T: Primitive>(&self) -> Result<T, TypeError> {
        if self.tag != T::TAG {
            return Err(TypeError::Expected {
                expected: T::TAG,
                actual: self.tag,
            });
        }
        Ok(T::from_bits(self.bits))
    }

    /// Reads the payload as a [`Reference`], failing on any other tag.
    pub fn as_reference(&self) -> Result<Reference, TypeError> {
        if self.tag != Type::Reference {
            return Err(TypeError::Expected {
                expected: Type::Reference,
                actual: self.tag,
            });
        }
        Ok(Reference {
            heap_id: self.bits as u32,
            array_index: (self.bits >> 32) as u32,
        })
    }

    fn check_pair<T: Primitive>(&self, rhs: &Value) -> Result<(), TypeError> {
        if self.tag != T::TAG {
            return Err(TypeError::Expected {
                expected: T::TAG,
                actual: self.tag,
            });
        }
        if rhs.tag != T::TAG {
            return Err(TypeError::Mismatched {
                lhs: self.tag,
                rhs: rhs.tag,
            });
        }
        Ok(())
    }

    /// Negates in place.
    pub fn negate<T: Negatable>(&mut self) -> Result<(), TypeError> {
        if self.tag != T::TAG {
            return Err(TypeError::Expected {
                expected: T::TAG,
                actual: self.tag,
            });
        }
        self.bits = T::from_bits(self.bits).negate().into_bits();
        Ok(())
    }

    /// `self += rhs`.
    pub fn add<T: Numeric>(&mut self, rhs: Value) -> Result<(), TypeError> {
        self.check_pair::<T>(&rhs)?;
        self.bits = T::from_bits(self.bits).add(T::from_bits(rhs.bits)).into_bits();
        Ok(())
    }

    /// `self -= rhs`.
    pub fn subtract<T: Numeric>(&mut self, rhs: Value) -> Result<(), TypeError> {
        self.check_pair::<T>(&rhs)?;
        self.bits = T::from_bits(self.bits).sub(T::from_bits(rhs.bits)).into_bits();
        Ok(())
    }

    /// `self *= rhs`.
    pub fn multiply<T: Numeric>(&mut self, rhs: Value) -> Result<(), TypeError> {
        self.check_pair::<T>(&rhs)?;
        self.bits = T::from_bits(self.bits).mul(T::from_bits(rhs.bits)).into_bits();
        Ok(())
    }

    /// `self /= rhs`. Integer division by zero is an [`ArithmeticError`].
    pub fn divide<T: Numeric>(&mut self, rhs: Value) -> Result<(), ValueError> {
        self.check_pair::<T>(&rhs)?;
        let v = T::from_bits(self.bits).div(T::from_bits(rhs.bits))?;
        self.bits = v.into_bits();
        Ok(())
    }

    /// `self %= rhs`. Float remainder follows IEEE 754 remainder semantics.
    pub fn remainder<T: Numeric>(&mut self, rhs: Value) -> Result<(), ValueError> {
        self.check_pair::<T>(&rhs)?;
        let v = T::from_bits(self.bits).rem(T::from_bits(rhs.bits))?;
        self.bits = v.into_bits();
        Ok(())
    }

    /// `self &= rhs`.
    pub fn bit_and<T: Integral>(&mut self, rhs: Value) -> Result<(), TypeError> {
        self.check_pair::<T>(&rhs)?;
        self.bits = T::from_bits(self.bits).and(T::from_bits(rhs.bits)).into_bits();
        Ok(())
    }

    /// `self |= rhs`.
    pub fn bit_or<T: Integral>(&mut self, rhs: Value) -> Result<(), TypeError> {
        self.check_pair::<T>(&rhs)?;
        self.bits = T::from_bits(self.bits).or(T::from_bits(rhs.bits)).into_bits();
        Ok(())
    }

    /// `self ^= rhs`.
    pub fn bit_xor<T: Integral>(&mut self, rhs: Value) -> Result<(), TypeError> {
        self.check_pair::<T>(&rhs)?;
        self.bits = T::from_bits(self.bits).xor(T::from_bits(rhs.bits)).into_bits();
        Ok(())
    }

    fn shift_count(count: &Value) -> Result<u32, TypeError> {
        if count.tag != Type::Uint32 {
            return Err(TypeError::BadShiftCount { actual: count.tag });
        }
        Ok(count.bits as u32)
    }

    /// `self <<= count`. The count must hold `Uint32` regardless of `T`.
    pub fn shift_left<T: Integral>(&mut self, count: Value) -> Result<(), TypeError> {
        let n = Self::shift_count(&count)?;
        if self.tag != T::TAG {
            return Err(TypeError::Expected {
                expected: T::TAG,
                actual: self.tag,
            });
        }
        self.bits = T::from_bits(self.bits).shl(n).into_bits();
        Ok(())
    }

    /// `self >>= count`. Arithmetic for signed `T`, logical for unsigned.
    pub fn shift_right<T: Integral>(&mut self, count: Value) -> Result<(), TypeError> {
        let n = Self::shift_count(&count)?;
        if self.tag != T::TAG {
            return Err(TypeError::Expected {
                expected: T::TAG,
                actual: self.tag,
            });
        }
        self.bits = T::from_bits(self.bits).shr(n).into_bits();
        Ok(())
    }

    /// Inverts the full 64-bit payload view. Valid on the four integral tags.
    pub fn invert(&mut self) -> Result<(), TypeError> {
        if !self.tag.is_integral() {
            return Err(TypeError::NotIntegral { actual: self.tag });
        }
        self.bits = !self.bits;
        Ok(())
    }

    /// Signed comparison, restricted to `Int32`/`Int64`. Returns -1/0/+1.
    pub fn compare_signed(&self, rhs: &Value) -> Result<i32, TypeError> {
        if self.tag != rhs.tag {
            return Err(TypeError::Mismatched {
                lhs: self.tag,
                rhs: rhs.tag,
            });
        }
        match self.tag {
            Type::Int32 => Ok(order(i32::from_bits(self.bits), i32::from_bits(rhs.bits))),
            Type::Int64 => Ok(order(i64::from_bits(self.bits), i64::from_bits(rhs.bits))),
            actual => Err(TypeError::NotComparable { actual }),
        }
    }

    /// Unsigned comparison, restricted to `Uint32`/`Uint64`. Returns -1/0/+1.
    pub fn compare_unsigned(&self, rhs: &Value) -> Result<i32, TypeError> {
        if self.tag != rhs.tag {
            return Err(TypeError::Mismatched {
                lhs: self.tag,
                rhs: rhs.tag,
            });
        }
        match self.tag {
            Type::Uint32 => Ok(order(u32::from_bits(self.bits), u32::from_bits(rhs.bits))),
            Type::Uint64 => Ok(order(u64::from_bits(self.bits), u64::from_bits(rhs.bits))),
            actual => Err(TypeError::NotComparable { actual }),
        }
    }

    /// Float comparison, restricted to `Float32`/`Float64`. Returns -1/0/+1;
    /// unordered operands (NaN) compare as 0.
    pub fn compare_float(&self, rhs: &Value) -> Result<i32, TypeError> {
        if self.tag != rhs.tag {
            return Err(TypeError::Mismatched {
                lhs: self.tag,
                rhs: rhs.tag,
            });
        }
        match self.tag {
            Type::Float32 => Ok(order_partial(
                <f32 as Primitive>::from_bits(self.bits),
                <f32 as Primitive>::from_bits(rhs.bits),
            )),
            Type::Float64 => Ok(order_partial(
                <f64 as Primitive>::from_bits(self.bits),
                <f64 as Primitive>::from_bits(rhs.bits),
            )),
            actual => Err(TypeError::NotComparable { actual }),
        }
    }

    /// Re-tags and numerically casts from `From` to `To`.
    pub fn convert<From, To>(&mut self) -> Result<(), TypeError>
    where
        From: CastTo<To>,
        To: Primitive,
    {
        if self.tag != From::TAG {
            return Err(TypeError::Expected {
                expected: From::TAG,
                actual: self.tag,
            });
        }
        self.bits = From::from_bits(self.bits).cast().into_bits();
        self.tag = To::TAG;
        Ok(())
    }
}

fn order<T: Ord>(a: T, b: T) -> i32 {
    match a.cmp(&b) {
        core::cmp::Ordering::Less => -1,
        core::cmp::Ordering::Equal => 0,
        core::cmp::Ordering::Greater => 1,
    }
}

fn order_partial<T: PartialOrd>(a: T, b: T) -> i32 {
    if a < b {
        -1
    } else if a > b {
        1
    } else {
        0
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Type::Uninit => write!(f, "<uninit>"),
            Type::Int8 => write!(f, "Int8({})", i8::from_bits(self.bits)),
            Type::Int16 => write!(f, "Int16({})", i16::from_bits(self.bits)),
            Type::Int32 => write!(f, "Int32({})", i32::from_bits(self.bits)),
            Type::Int64 => write!(f, "Int64({})", i64::from_bits(self.bits)),
            Type::Uint8 => write!(f, "Uint8({})", u8::from_bits(self.bits)),
            Type::Uint16 => write!(f, "Uint16({})", u16::from_bits(self.bits)),
            Type::Uint32 => write!(f, "Uint32({})", u32::from_bits(self.bits)),
            Type::Uint64 => write!(f, "Uint64({})", u64::from_bits(self.bits)),
            Type::Float32 => write!(f, "Float32({})", <f32 as Primitive>::from_bits(self.bits)),
            Type::Float64 => write!(f, "Float64({})", <f64 as Primitive>::from_bits(self.bits)),
            Type::Reference => {
                let r = Reference {
                    heap_id: self.bits as u32,
                    array_index: (self.bits >> 32) as u32,
                };
                write!(f, "Reference({}, {})", r.heap_id, r.array_index)
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
