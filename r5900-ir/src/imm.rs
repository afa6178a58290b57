use num_bigint::{BigInt, BigUint};
use num_traits::{One, ToPrimitive, Zero};

use crate::{
    types::{DataType, Primitive},
    ExprError,
};

/// All-ones mask covering `bits` bits.
pub fn mask(bits: u32) -> BigUint {
    (BigUint::one() << bits) - 1u32
}

/// Wraps `value` into `bits` bits using two's complement.
pub fn wrap(value: &BigInt, bits: u32) -> BigUint {
    let modulus = BigInt::one() << bits;
    let wrapped = ((value % &modulus) + &modulus) % &modulus;
    wrapped.into_parts().1
}

/// Interprets the low `bits` bits of `value` as a two's complement number.
pub fn sign_extend(value: &BigUint, bits: u32) -> BigInt {
    let value = value & mask(bits);
    match bits > 0 && value.bit(bits as u64 - 1) {
        true => BigInt::from(value) - (BigInt::one() << bits),
        false => BigInt::from(value),
    }
}

/// Copies up to 16 bytes of `value` into a little-endian buffer.
fn to_buffer(value: &BigUint) -> [u8; 16] {
    let mut buf = [0; 16];
    let bytes = value.to_bytes_le();
    let len = bytes.len().min(buf.len());
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

fn f32_from_bits(value: &BigUint) -> f32 {
    let buf = to_buffer(value);
    f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

fn f64_from_bits(value: &BigUint) -> f64 {
    let buf = to_buffer(value);
    f64::from_le_bytes([buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7]])
}

/// A constant with an arbitrary precision bit pattern whose meaning is given by its type.
#[derive(Clone, PartialEq, Eq)]
pub struct Imm {
    bits: BigUint,
    ty: DataType,
}

impl std::fmt::Debug for Imm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.ty.is_float() {
            true => write!(f, "Imm({}, {})", self.to_f64(), self.ty),
            false => write!(f, "Imm({}, {})", self.value(), self.ty),
        }
    }
}

impl Imm {
    /// Creates an immediate holding `value` converted to `ty`.
    ///
    /// Integer types keep the two's complement bit pattern of `value` truncated to the width of
    /// `ty`, floating point types hold the IEEE-754 encoding of the nearest representable value.
    pub fn typed(value: impl Into<BigInt>, ty: DataType) -> Self {
        let value = value.into();
        match ty.primitive_kind() {
            Some(Primitive::F32) => Self::f32(value.to_f32().unwrap_or(f32::NAN)),
            Some(Primitive::F64) => Self::f64(value.to_f64().unwrap_or(f64::NAN)),
            _ => {
                let bits = wrap(&value, ty.bits());
                Self { bits, ty }
            }
        }
    }

    /// Creates an immediate from a raw bit pattern, truncated to the width of `ty`.
    pub fn from_bits(bits: impl Into<BigUint>, ty: DataType) -> Self {
        let bits = bits.into() & mask(ty.bits());
        Self { bits, ty }
    }

    pub fn i8(value: i8) -> Self {
        Self::typed(value, DataType::primitive(Primitive::I8))
    }

    pub fn i16(value: i16) -> Self {
        Self::typed(value, DataType::primitive(Primitive::I16))
    }

    pub fn i32(value: i32) -> Self {
        Self::typed(value, DataType::primitive(Primitive::I32))
    }

    pub fn i64(value: i64) -> Self {
        Self::typed(value, DataType::primitive(Primitive::I64))
    }

    pub fn i128(value: i128) -> Self {
        Self::typed(value, DataType::primitive(Primitive::I128))
    }

    pub fn u8(value: u8) -> Self {
        Self::typed(value, DataType::primitive(Primitive::U8))
    }

    pub fn u16(value: u16) -> Self {
        Self::typed(value, DataType::primitive(Primitive::U16))
    }

    pub fn u32(value: u32) -> Self {
        Self::typed(value, DataType::primitive(Primitive::U32))
    }

    pub fn u64(value: u64) -> Self {
        Self::typed(value, DataType::primitive(Primitive::U64))
    }

    pub fn u128(value: u128) -> Self {
        Self::typed(value, DataType::primitive(Primitive::U128))
    }

    pub fn f32(value: f32) -> Self {
        Self { bits: value.to_bits().into(), ty: DataType::primitive(Primitive::F32) }
    }

    pub fn f64(value: f64) -> Self {
        Self { bits: value.to_bits().into(), ty: DataType::primitive(Primitive::F64) }
    }

    pub fn bool(value: bool) -> Self {
        Self { bits: (value as u8).into(), ty: DataType::bool() }
    }

    pub fn ty(&self) -> &DataType {
        &self.ty
    }

    pub fn bits(&self) -> &BigUint {
        &self.bits
    }

    pub fn width(&self) -> u32 {
        self.ty.bits()
    }

    /// The integer value of the immediate, sign-extended if its type is signed.
    pub fn value(&self) -> BigInt {
        match self.ty.is_signed() && !self.ty.is_float() {
            true => sign_extend(&self.bits, self.width()),
            false => BigInt::from(self.bits.clone()),
        }
    }

    /// The low 64 bits of the bit pattern.
    pub fn to_u64(&self) -> u64 {
        let buf = to_buffer(&self.bits);
        u64::from_le_bytes([buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7]])
    }

    /// The value truncated to 64 bits.
    pub fn to_i64(&self) -> i64 {
        let value = wrap(&self.value(), 64);
        let buf = to_buffer(&value);
        i64::from_le_bytes([buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7]])
    }

    /// The value as a host float: floating point immediates are reinterpreted from their bit
    /// pattern, integers are converted.
    pub fn to_float(&self) -> Result<f64, ExprError> {
        match self.ty.primitive_kind() {
            Some(Primitive::F32) => Ok(f32_from_bits(&self.bits) as f64),
            Some(Primitive::F64) => Ok(f64_from_bits(&self.bits)),
            Some(p) if p.is_float() => Err(ExprError::UnsupportedFloatWidth(p.size())),
            _ => Ok(self.value().to_f64().unwrap_or(f64::NAN)),
        }
    }

    pub fn to_f32(&self) -> f32 {
        match self.ty.primitive_kind() {
            Some(Primitive::F32) => f32_from_bits(&self.bits),
            _ => self.to_f64() as f32,
        }
    }

    pub fn to_f64(&self) -> f64 {
        self.to_float().unwrap_or(f64::NAN)
    }

    /// Creates a floating point immediate of type `ty` from a host float.
    pub fn from_float(value: f64, ty: DataType) -> Result<Self, ExprError> {
        match ty.primitive_kind() {
            Some(Primitive::F32) => Ok(Self::f32(value as f32)),
            Some(Primitive::F64) => Ok(Self::f64(value)),
            _ if ty.is_float() => Err(ExprError::UnsupportedFloatWidth(ty.size())),
            _ => Ok(Self::typed(BigInt::from(value as i128), ty)),
        }
    }

    /// Returns an immediate with the same bit pattern reinterpreted as `ty`, truncated or
    /// zero-extended to its width.
    pub fn bitcast(&self, ty: DataType) -> Self {
        Self::from_bits(self.bits.clone(), ty)
    }

    /// Converts the value to `ty`, following C conversion rules.
    pub fn convert(&self, ty: DataType) -> Result<Self, ExprError> {
        match (self.ty.is_float(), ty.is_float()) {
            (false, false) if ty.is_bool() => Ok(Self::bool(!self.is_zero())),
            (false, false) => Ok(Self::typed(self.value(), ty)),
            (true, true) | (false, true) => Self::from_float(self.to_float()?, ty),
            (true, false) => {
                let value = self.to_float()?;
                match ty.is_bool() {
                    true => Ok(Self::bool(value != 0.0)),
                    false => Ok(Self::typed(BigInt::from(value.trunc() as i128), ty)),
                }
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        match self.ty.is_float() {
            true => self.to_f64() == 0.0,
            false => self.bits.is_zero(),
        }
    }

    pub fn is_one(&self) -> bool {
        match self.ty.is_float() {
            true => self.to_f64() == 1.0,
            false => self.bits.is_one(),
        }
    }

    pub fn is_all_ones(&self) -> bool {
        !self.ty.is_float() && self.bits == mask(self.width())
    }

    pub fn is_negative(&self) -> bool {
        match self.ty.is_float() {
            true => self.to_f64() < 0.0,
            false => self.value() < BigInt::zero(),
        }
    }
}
