//! Prime-field elements over 256-bit moduli, stored in [Montgomery form]
//! for inversion-free multiplication.
//!
//! A field is described by an [`FpParams`] implementation carrying the
//! modulus; the Montgomery constants are derived from it at compile time.
//! Both fields of the signature engine (coordinates modulo `p`, scalars
//! modulo `n`) are instances of the same [`Fp`] type.
//!
//! [Montgomery form]: https://en.wikipedia.org/wiki/Montgomery_modular_multiplication

use core::{
    fmt::{Debug, Formatter},
    marker::PhantomData,
    ops::{Add, Mul, Neg, Sub},
};

use educe::Educe;
use zeroize::Zeroize;

use crate::arithmetic::{self, U256};

/// The configuration of a prime field: its modulus, plus derived Montgomery
/// constants.
pub trait FpParams: Send + Sync + 'static + Sized {
    /// The modulus, a 256-bit prime with its top bit set.
    const MODULUS: U256;

    /// `-MODULUS^{-1} mod 2^64`, the Montgomery reduction factor.
    const INV: u64 = inv::<Self>();

    /// `R = 2^256 mod MODULUS`, the Montgomery radix. The unit element of
    /// the field in Montgomery form.
    const R: U256 = montgomery_r::<Self>();

    /// `R² mod MODULUS`, used to convert integers into Montgomery form.
    const R2: U256 = montgomery_r2::<Self>();
}

/// Computes `-MODULUS^{-1} mod 2^64`.
///
/// Exponentiates by `totient(2^64) - 1`, i.e. 63 squarings each followed by
/// a multiplication.
const fn inv<P: FpParams>() -> u64 {
    let m = P::MODULUS.as_limbs()[0];
    let mut inv = 1u64;
    let mut i = 0;
    while i < 63 {
        inv = inv.wrapping_mul(inv);
        inv = inv.wrapping_mul(m);
        i += 1;
    }
    inv.wrapping_neg()
}

/// Computes `2^256 mod MODULUS`.
const fn montgomery_r<P: FpParams>() -> U256 {
    assert!(
        P::MODULUS.as_limbs()[3] >> 63 == 1,
        "modulus must have its top bit set"
    );
    // With the top bit set, 2^256 < 2 * MODULUS, so the remainder is just
    // 2^256 - MODULUS.
    P::MODULUS.ct_neg()
}

/// Computes `2^512 mod MODULUS` by doubling `R` another 256 times.
const fn montgomery_r2<P: FpParams>() -> U256 {
    let mut r = montgomery_r::<P>();
    let mut i = 0;
    while i < 256 {
        let (doubled, carry) = r.ct_mul2();
        r = if carry || doubled.ct_geq(&P::MODULUS) {
            doubled.ct_sub(&P::MODULUS).0
        } else {
            doubled
        };
        i += 1;
    }
    r
}

/// An element of the prime field with modulus `P::MODULUS`.
#[derive(Educe)]
#[educe(Clone, Copy, PartialEq, Eq)]
pub struct Fp<P: FpParams> {
    /// The element multiplied by `R`, i.e. in Montgomery form.
    mont: U256,
    #[doc(hidden)]
    _params: PhantomData<P>,
}

impl<P: FpParams> Fp<P> {
    /// The additive identity.
    pub const ZERO: Self = Self::from_mont(U256::ZERO);
    /// The multiplicative identity.
    pub const ONE: Self = Self::from_mont(P::R);

    const fn from_mont(mont: U256) -> Self {
        Self { mont, _params: PhantomData }
    }

    /// Constructs a field element from an integer, reducing it modulo
    /// `P::MODULUS`. Any 256-bit value is a valid input.
    pub const fn new(value: U256) -> Self {
        let raw = Self::from_mont(value);
        if value.is_zero() {
            raw
        } else {
            // Multiplying by R² converts into Montgomery form and reduces.
            raw.mont_mul(&Self::from_mont(P::R2))
        }
    }

    /// Converts the element back to an integer below `P::MODULUS`.
    #[must_use]
    pub fn into_bigint(self) -> U256 {
        // Montgomery reduction of the residue with an implicit zero high
        // half: one reduction step per limb.
        let mut r = self.mont.limbs;
        for i in 0..4 {
            let k = r[i].wrapping_mul(P::INV);
            let (_, mut carry) =
                arithmetic::mac(r[i], k, P::MODULUS.as_limbs()[0]);
            for j in 1..4 {
                (r[(i + j) % 4], carry) = arithmetic::carrying_mac(
                    r[(i + j) % 4],
                    k,
                    P::MODULUS.as_limbs()[j],
                    carry,
                );
            }
            r[i] = carry;
        }
        U256::new(r)
    }

    /// Whether `self` is the additive identity.
    pub fn is_zero(&self) -> bool {
        self.mont.is_zero()
    }

    /// Returns `2 * self`.
    #[must_use]
    pub fn double(&self) -> Self {
        let mut mont = self.mont;
        let carry = mont.mul2();
        Self::from_mont(reduce_once::<P>(mont, carry))
    }

    /// Returns `self * self`.
    #[must_use]
    pub fn square(&self) -> Self {
        self.mont_mul(self)
    }

    /// Computes the multiplicative inverse if `self` is nonzero.
    ///
    /// Binary extended GCD over the Montgomery residue; see Guajardo,
    /// Kumar, Paar, Pelzl, "Efficient Software-Implementation of Finite
    /// Fields with Applications to Cryptography", Algorithm 16.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        if self.is_zero() {
            return None;
        }

        let mut u = self.mont;
        let mut v = P::MODULUS;
        // Starting from R² instead of R saves a conversion at the end.
        let mut b = Self::from_mont(P::R2);
        let mut c = Self::ZERO;

        while u != U256::ONE && v != U256::ONE {
            while u.is_even() {
                u.div2();
                b.halve();
            }
            while v.is_even() {
                v.div2();
                c.halve();
            }
            if v < u {
                u.sub_with_borrow(&v);
                b = b - c;
            } else {
                v.sub_with_borrow(&u);
                c = c - b;
            }
        }

        Some(if u == U256::ONE { b } else { c })
    }

    /// Halves the residue modulo `P::MODULUS` in place.
    fn halve(&mut self) {
        if self.mont.is_even() {
            self.mont.div2();
        } else {
            // Make the residue even by adding the (odd) modulus; the carry
            // becomes the top bit after the shift.
            let carry = self.mont.add_with_carry(&P::MODULUS);
            self.mont.div2();
            if carry {
                self.mont.limbs[3] |= 1 << 63;
            }
        }
    }

    /// CIOS Montgomery multiplication with interleaved reduction, usable in
    /// const contexts.
    const fn mont_mul(self, other: &Self) -> Self {
        let a = self.mont.as_limbs();
        let b = other.mont.as_limbs();
        let modulus = P::MODULUS;
        let m = modulus.as_limbs();

        // Schoolbook product, split into a low and a high half.
        let (mut lo, mut hi) = ([0u64; 4], [0u64; 4]);
        let mut i = 0;
        while i < 4 {
            let mut carry = 0;
            let mut j = 0;
            while j < 4 {
                let k = i + j;
                if k >= 4 {
                    (hi[k - 4], carry) =
                        arithmetic::carrying_mac(hi[k - 4], a[i], b[j], carry);
                } else {
                    (lo[k], carry) =
                        arithmetic::carrying_mac(lo[k], a[i], b[j], carry);
                }
                j += 1;
            }
            hi[i] = carry;
            i += 1;
        }

        // Montgomery reduction, one limb of the low half at a time.
        let mut carry2 = 0;
        let mut i = 0;
        while i < 4 {
            let k = lo[i].wrapping_mul(P::INV);
            let (_, mut carry) = arithmetic::mac(lo[i], k, m[0]);
            let mut j = 1;
            while j < 4 {
                let idx = i + j;
                if idx >= 4 {
                    (hi[idx - 4], carry) =
                        arithmetic::carrying_mac(hi[idx - 4], k, m[j], carry);
                } else {
                    (lo[idx], carry) =
                        arithmetic::carrying_mac(lo[idx], k, m[j], carry);
                }
                j += 1;
            }
            (hi[i], carry2) = arithmetic::adc(hi[i], carry, carry2);
            i += 1;
        }

        let product = U256::new(hi);
        let reduced = if carry2 != 0 || product.ct_geq(&P::MODULUS) {
            product.ct_sub(&P::MODULUS).0
        } else {
            product
        };
        Self::from_mont(reduced)
    }
}

/// Subtracts the modulus once if the value (plus a carry bit) reached it.
///
/// Sums and doublings of reduced elements stay below `2 * MODULUS`, so one
/// subtraction always suffices.
fn reduce_once<P: FpParams>(mut value: U256, carry: bool) -> U256 {
    if carry || value >= P::MODULUS {
        value.sub_with_borrow(&P::MODULUS);
    }
    value
}

impl<P: FpParams> Add for Fp<P> {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        let carry = self.mont.add_with_carry(&rhs.mont);
        Self::from_mont(reduce_once::<P>(self.mont, carry))
    }
}

impl<P: FpParams> Sub for Fp<P> {
    type Output = Self;

    fn sub(mut self, rhs: Self) -> Self {
        // Lift into range first if the subtrahend is larger; the carry and
        // the final borrow cancel.
        if rhs.mont > self.mont {
            self.mont.add_with_carry(&P::MODULUS);
        }
        self.mont.sub_with_borrow(&rhs.mont);
        self
    }
}

impl<P: FpParams> Mul for Fp<P> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.mont_mul(&rhs)
    }
}

impl<P: FpParams> Neg for Fp<P> {
    type Output = Self;

    fn neg(self) -> Self {
        if self.is_zero() {
            return self;
        }
        let mut mont = P::MODULUS;
        mont.sub_with_borrow(&self.mont);
        Self::from_mont(mont)
    }
}

impl<P: FpParams> Debug for Fp<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        Debug::fmt(&self.into_bigint(), f)
    }
}

impl<P: FpParams> Zeroize for Fp<P> {
    // The phantom parameter carries no element data and needs no zeroizing.
    fn zeroize(&mut self) {
        self.mont.zeroize();
    }
}

/// This macro converts a hex string literal to a field element.
#[macro_export]
macro_rules! fp_from_hex {
    ($num:literal) => {
        $crate::field::Fp::new($crate::arithmetic::from_str_hex($num))
    };
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::from_hex;

    // The prime field the SM2 curve coordinates live in.
    struct TestParams;
    impl FpParams for TestParams {
        const MODULUS: U256 = from_hex!(
            "FFFFFFFEFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF00000000FFFFFFFFFFFFFFFF"
        );
    }

    type F = Fp<TestParams>;

    fn element(bytes: &[u8; 32]) -> F {
        F::new(U256::from_bytes_be(bytes))
    }

    #[test]
    fn montgomery_constants() {
        assert_eq!(
            TestParams::R,
            from_hex!("0000000100000000000000000000000000000000FFFFFFFF0000000000000001")
        );
        assert_eq!(
            TestParams::R2,
            from_hex!("0000000400000002000000010000000100000002FFFFFFFF0000000200000003")
        );
        assert_eq!(TestParams::INV, 1);

        // INV is a 2^64 inverse: MODULUS * INV = -1 mod 2^64.
        assert_eq!(
            TestParams::MODULUS.as_limbs()[0].wrapping_mul(TestParams::INV),
            u64::MAX
        );
    }

    #[test]
    fn encoding_round_trip() {
        let b = from_hex!(
            "28E9FA9E9D9F5E344D5A9E4BCF6509A7F39789F515AB8F92DDBCBD414D940E93"
        );
        assert_eq!(F::new(b).into_bigint(), b);

        // Values at or above the modulus reduce.
        assert!(F::new(TestParams::MODULUS).is_zero());
        let modulus_plus_one = {
            let mut v = TestParams::MODULUS;
            v.add_with_carry(&U256::new([1, 0, 0, 0]));
            v
        };
        assert_eq!(F::new(modulus_plus_one), F::ONE);
    }

    #[test]
    fn identities() {
        let b = fp_from_hex!(
            "28E9FA9E9D9F5E344D5A9E4BCF6509A7F39789F515AB8F92DDBCBD414D940E93"
        );

        assert_eq!(F::ZERO + b, b);
        assert_eq!(F::ONE * b, b);
        assert!((b - b).is_zero());
        assert!(F::ZERO.is_zero());
        assert_eq!(F::ONE.into_bigint(), U256::ONE);
    }

    #[test]
    fn zero_has_no_inverse() {
        assert!(F::ZERO.inverse().is_none());
        assert_eq!(F::ONE.inverse(), Some(F::ONE));
    }

    proptest! {
        #[test]
        fn add_is_commutative(a: [u8; 32], b: [u8; 32]) {
            let (a, b) = (element(&a), element(&b));
            prop_assert_eq!(a + b, b + a);
        }

        #[test]
        fn mul_is_commutative_and_associative(
            a: [u8; 32],
            b: [u8; 32],
            c: [u8; 32],
        ) {
            let (a, b, c) = (element(&a), element(&b), element(&c));
            prop_assert_eq!(a * b, b * a);
            prop_assert_eq!((a * b) * c, a * (b * c));
        }

        #[test]
        fn mul_distributes_over_add(a: [u8; 32], b: [u8; 32], c: [u8; 32]) {
            let (a, b, c) = (element(&a), element(&b), element(&c));
            prop_assert_eq!(a * (b + c), a * b + a * c);
        }

        #[test]
        fn subtraction_and_negation_agree(a: [u8; 32], b: [u8; 32]) {
            let (a, b) = (element(&a), element(&b));
            prop_assert_eq!(a - b, a + (-b));
            prop_assert!((a + (-a)).is_zero());
        }

        #[test]
        fn doubling_and_squaring_match_mul(a: [u8; 32]) {
            let a = element(&a);
            prop_assert_eq!(a.double(), a + a);
            prop_assert_eq!(a.square(), a * a);
        }

        #[test]
        fn inverse_round_trip(a: [u8; 32]) {
            let a = element(&a);
            prop_assume!(!a.is_zero());

            let inv = a.inverse().expect("nonzero element inverts");
            prop_assert_eq!(a * inv, F::ONE);
        }

        #[test]
        fn into_bigint_is_reduced(a: [u8; 32]) {
            let value = element(&a).into_bigint();
            prop_assert!(value < TestParams::MODULUS);
        }
    }
}
