//! Short Weierstrass curve arithmetic over 256-bit prime fields, and the
//! curve recommended by [GB/T 32918], the Chinese national standard for SM2
//! public-key cryptography.
//!
//! Points carry two representations. [`Affine`] coordinates with an
//! explicit identity flag implement the textbook chord-and-tangent group
//! law, paying one field inversion per operation. [`Projective`] points use
//! [Jacobian coordinates], where `(X, Y, Z)` stands for the affine point
//! `(X/Z², Y/Z³)` and `Z = 0` is the identity; addition and doubling are
//! inversion-free, which makes them the form scalar multiplication runs in.
//!
//! [GB/T 32918]: https://www.chinesestandard.net/PDF/English.aspx/GBT32918.5-2017
//! [Jacobian coordinates]: https://www.hyperelliptic.org/EFD/g1p/auto-shortw-jacobian.html

use core::fmt::{Debug, Formatter};

use educe::Educe;

use crate::{
    arithmetic::U256,
    field::{Fp, FpParams},
    fp_from_hex, from_hex,
};

/// The constants defining a short Weierstrass curve
/// `y² = x³ + a·x + b` with a prime-order group.
///
/// The group generated by [`Self::GENERATOR`] must be the whole curve,
/// i.e. the cofactor must be one; every point on the curve is then a
/// multiple of the generator.
pub trait CurveConfig: Send + Sync + Sized + 'static {
    /// Parameters of the base field the coordinates live in.
    type BaseParams: FpParams;
    /// Parameters of the scalar field, i.e. integers modulo the group
    /// order.
    type ScalarParams: FpParams;

    /// Coefficient `a` of the curve equation.
    const A: BaseField<Self>;
    /// Coefficient `b` of the curve equation.
    const B: BaseField<Self>;
    /// Generator of the curve group.
    const GENERATOR: Affine<Self>;
}

/// The field the coordinates of points on curve `C` live in.
pub type BaseField<C> = Fp<<C as CurveConfig>::BaseParams>;
/// Integers modulo the order of the group of curve `C`.
pub type ScalarField<C> = Fp<<C as CurveConfig>::ScalarParams>;

/// A curve point in affine coordinates, or the identity.
#[derive(Educe)]
#[educe(Copy, Clone, PartialEq, Eq)]
#[must_use]
pub struct Affine<C: CurveConfig> {
    /// The x-coordinate.
    pub x: BaseField<C>,
    /// The y-coordinate.
    pub y: BaseField<C>,
    /// Whether this is the identity ("point at infinity").
    pub infinity: bool,
}

impl<C: CurveConfig> Debug for Affine<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        if self.infinity {
            write!(f, "infinity")
        } else {
            write!(f, "({:?}, {:?})", self.x, self.y)
        }
    }
}

impl<C: CurveConfig> Affine<C> {
    /// Constructs a point from its coordinates, checking that it lies on
    /// the curve.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates do not satisfy the curve equation.
    pub fn new(x: BaseField<C>, y: BaseField<C>) -> Self {
        let point = Self::new_unchecked(x, y);
        assert!(point.is_on_curve());
        point
    }

    /// Constructs a point from its coordinates without checking that it
    /// lies on the curve.
    pub const fn new_unchecked(x: BaseField<C>, y: BaseField<C>) -> Self {
        Self { x, y, infinity: false }
    }

    /// The identity element.
    pub const fn identity() -> Self {
        Self { x: Fp::ZERO, y: Fp::ZERO, infinity: true }
    }

    /// The fixed generator of the curve group.
    pub fn generator() -> Self {
        C::GENERATOR
    }

    /// Whether this is the identity element.
    pub fn is_identity(&self) -> bool {
        self.infinity
    }

    /// The coordinates of the point, unless it is the identity.
    pub fn xy(&self) -> Option<(BaseField<C>, BaseField<C>)> {
        (!self.infinity).then_some((self.x, self.y))
    }

    /// Whether the coordinates satisfy the curve equation.
    pub fn is_on_curve(&self) -> bool {
        if self.infinity {
            return true;
        }
        let x3axb = self.x.square() * self.x + C::A * self.x + C::B;
        self.y.square() == x3axb
    }

    /// Adds `other` to `self` with the chord-and-tangent formulas, staying
    /// in affine coordinates.
    ///
    /// Each operation pays one field inversion to compute the slope, which
    /// is the cost [`Projective`] arithmetic avoids. Kept as the reference
    /// implementation of the group law.
    pub fn add_affine(&self, other: &Self) -> Self {
        if self.infinity {
            return *other;
        }
        if other.infinity {
            return *self;
        }

        if self.x == other.x {
            // Mirror points add to the identity, equal points double.
            return if self.y == other.y {
                self.double_affine()
            } else {
                Self::identity()
            };
        }

        // λ = (y₂ - y₁) / (x₂ - x₁)
        let dx_inv = (other.x - self.x)
            .inverse()
            .expect("x-coordinates are distinct");
        let lambda = (other.y - self.y) * dx_inv;
        self.chord(lambda, other.x)
    }

    /// Doubles `self` with the tangent-line formula, staying in affine
    /// coordinates.
    pub fn double_affine(&self) -> Self {
        if self.infinity {
            return *self;
        }
        // A point with a vertical tangent doubles to the identity.
        if self.y.is_zero() {
            return Self::identity();
        }

        // λ = (3x² + a) / 2y
        let xx = self.x.square();
        let two_y_inv =
            self.y.double().inverse().expect("y-coordinate is nonzero");
        let lambda = (xx.double() + xx + C::A) * two_y_inv;
        self.chord(lambda, self.x)
    }

    /// Double-and-add over the affine group law.
    pub fn mul_bigint_affine(&self, k: &U256) -> Self {
        let mut res = Self::identity();
        for bit in k.bits_be() {
            res = res.double_affine();
            if bit {
                res = res.add_affine(self);
            }
        }
        res
    }

    /// Double-and-add in Jacobian coordinates with mixed additions; the
    /// usual way to compute `[k]P`.
    pub fn mul_bigint(&self, k: &U256) -> Projective<C> {
        let mut res = Projective::identity();
        for bit in k.bits_be() {
            res.double_in_place();
            if bit {
                res.add_assign_affine(self);
            }
        }
        res
    }

    /// Completes a chord-and-tangent step from the slope `lambda` and the
    /// second x-coordinate.
    fn chord(&self, lambda: BaseField<C>, x2: BaseField<C>) -> Self {
        let x3 = lambda.square() - self.x - x2;
        let y3 = lambda * (self.x - x3) - self.y;
        Self::new_unchecked(x3, y3)
    }
}

impl<C: CurveConfig> core::ops::Neg for Affine<C> {
    type Output = Self;

    /// The identity negates to itself; `(x, y)` negates to `(x, -y)`.
    fn neg(mut self) -> Self {
        self.y = -self.y;
        self
    }
}

/// A curve point in Jacobian coordinates.
#[derive(Educe)]
#[educe(Copy, Clone, Eq(bound(C: CurveConfig)), Debug)]
#[must_use]
pub struct Projective<C: CurveConfig> {
    /// The X-coordinate.
    pub x: BaseField<C>,
    /// The Y-coordinate.
    pub y: BaseField<C>,
    /// The Z-coordinate; zero denotes the identity.
    pub z: BaseField<C>,
}

impl<C: CurveConfig> PartialEq for Projective<C> {
    fn eq(&self, other: &Self) -> bool {
        if self.is_identity() {
            return other.is_identity();
        }
        if other.is_identity() {
            return false;
        }

        // X1/Z1² == X2/Z2²  <=>  X1·Z2² == X2·Z1², and likewise for Y with
        // cubes, avoiding the inversions.
        let z1z1 = self.z.square();
        let z2z2 = other.z.square();
        self.x * z2z2 == other.x * z1z1
            && self.y * (z2z2 * other.z) == other.y * (z1z1 * self.z)
    }
}

impl<C: CurveConfig> Projective<C> {
    /// Constructs a point from Jacobian coordinates, checking that it lies
    /// on the curve.
    ///
    /// # Panics
    ///
    /// Panics if the corresponding affine point does not satisfy the curve
    /// equation.
    pub fn new(
        x: BaseField<C>,
        y: BaseField<C>,
        z: BaseField<C>,
    ) -> Self {
        let point = Self::new_unchecked(x, y, z);
        assert!(point.to_affine().is_on_curve());
        point
    }

    /// Constructs a point from Jacobian coordinates without checking that
    /// it lies on the curve.
    pub const fn new_unchecked(
        x: BaseField<C>,
        y: BaseField<C>,
        z: BaseField<C>,
    ) -> Self {
        Self { x, y, z }
    }

    /// The identity element.
    pub const fn identity() -> Self {
        Self::new_unchecked(Fp::ONE, Fp::ONE, Fp::ZERO)
    }

    /// Whether this is the identity element.
    pub fn is_identity(&self) -> bool {
        self.z.is_zero()
    }

    /// Normalizes to affine coordinates, at the cost of one field
    /// inversion.
    pub fn to_affine(&self) -> Affine<C> {
        if self.is_identity() {
            return Affine::identity();
        }

        // Z is nonzero, so it has an inverse in the field.
        let z_inv = self.z.inverse().expect("Z-coordinate is nonzero");
        let z_inv2 = z_inv.square();
        Affine::new_unchecked(
            self.x * z_inv2,
            self.y * (z_inv2 * z_inv),
        )
    }

    /// Doubles the point in place:
    ///
    /// ```text
    /// S = 4·X·Y², M = 3·X² + a·Z⁴,
    /// X' = M² - 2·S, Y' = M·(S - X') - 8·Y⁴, Z' = 2·Y·Z.
    /// ```
    ///
    /// A point with `Y = 0` ends up with `Z' = 0`, the identity.
    pub fn double_in_place(&mut self) {
        if self.is_identity() {
            return;
        }

        let yy = self.y.square();
        let s = (self.x * yy).double().double();
        let xx = self.x.square();
        let m = xx.double() + xx + C::A * self.z.square().square();

        let x3 = m.square() - s.double();
        let y3 = m * (s - x3) - yy.square().double().double().double();
        let z3 = (self.y * self.z).double();

        *self = Self::new_unchecked(x3, y3, z3);
    }

    /// Mixed addition of an affine point, i.e. the general Jacobian
    /// addition specialized to `Z₂ = 1`, so `U₁ = X₁` and `S₁ = Y₁`.
    pub fn add_assign_affine(&mut self, other: &Affine<C>) {
        if other.infinity {
            return;
        }
        if self.is_identity() {
            *self = (*other).into();
            return;
        }

        let z1z1 = self.z.square();
        let u2 = other.x * z1z1;
        let s2 = other.y * self.z * z1z1;

        if self.x == u2 {
            if self.y == s2 {
                // Same affine point: double instead.
                self.double_in_place();
            } else {
                // Mirror points add to the identity.
                *self = Self::identity();
            }
            return;
        }

        let h = u2 - self.x;
        let r = s2 - self.y;
        let hh = h.square();
        let hhh = h * hh;
        let v = self.x * hh;

        let x3 = r.square() - hhh - v.double();
        let y3 = r * (v - x3) - self.y * hhh;
        let z3 = h * self.z;

        *self = Self::new_unchecked(x3, y3, z3);
    }

    /// General Jacobian addition:
    ///
    /// ```text
    /// U₁ = X₁·Z₂², U₂ = X₂·Z₁², S₁ = Y₁·Z₂³, S₂ = Y₂·Z₁³,
    /// H = U₂ - U₁, R = S₂ - S₁,
    /// X₃ = R² - H³ - 2·U₁·H², Y₃ = R·(U₁·H² - X₃) - S₁·H³,
    /// Z₃ = H·Z₁·Z₂.
    /// ```
    ///
    /// Equal x-coordinates short-circuit into doubling or the identity.
    fn add_assign(&mut self, other: &Self) {
        if self.is_identity() {
            *self = *other;
            return;
        }
        if other.is_identity() {
            return;
        }

        let z1z1 = self.z.square();
        let z2z2 = other.z.square();
        let u1 = self.x * z2z2;
        let u2 = other.x * z1z1;
        let s1 = self.y * other.z * z2z2;
        let s2 = other.y * self.z * z1z1;

        if u1 == u2 {
            if s1 == s2 {
                self.double_in_place();
            } else {
                *self = Self::identity();
            }
            return;
        }

        let h = u2 - u1;
        let r = s2 - s1;
        let hh = h.square();
        let hhh = h * hh;
        let v = u1 * hh;

        let x3 = r.square() - hhh - v.double();
        let y3 = r * (v - x3) - s1 * hhh;
        let z3 = h * self.z * other.z;

        *self = Self::new_unchecked(x3, y3, z3);
    }
}

impl<C: CurveConfig> core::ops::Add for Projective<C> {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self.add_assign(&rhs);
        self
    }
}

// An affine point (x, y) lifts to Jacobian coordinates with Z = 1.
impl<C: CurveConfig> From<Affine<C>> for Projective<C> {
    fn from(p: Affine<C>) -> Self {
        if p.infinity {
            Self::identity()
        } else {
            Self::new_unchecked(p.x, p.y, Fp::ONE)
        }
    }
}

/// Base field parameters of the SM2 curve: the prime `p` the coordinates
/// are reduced by.
pub struct Sm2FqParam;

impl FpParams for Sm2FqParam {
    const MODULUS: U256 = from_hex!(
        "FFFFFFFEFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF00000000FFFFFFFFFFFFFFFF"
    );
}

/// Scalar field parameters of the SM2 curve: the prime order `n` of the
/// curve group.
pub struct Sm2FrParam;

impl FpParams for Sm2FrParam {
    const MODULUS: U256 = from_hex!(
        "FFFFFFFEFFFFFFFFFFFFFFFFFFFFFFFF7203DF6B21C6052B53BBF40939D54123"
    );
}

/// Base field of the SM2 curve.
pub type Fq = Fp<Sm2FqParam>;
/// Scalar field of the SM2 curve.
pub type Fr = Fp<Sm2FrParam>;

/// The elliptic curve recommended by GB/T 32918.
pub struct Sm2Config;

impl CurveConfig for Sm2Config {
    type BaseParams = Sm2FqParam;
    type ScalarParams = Sm2FrParam;

    const A: Fq = fp_from_hex!(
        "FFFFFFFEFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF00000000FFFFFFFFFFFFFFFC"
    );
    const B: Fq = fp_from_hex!(
        "28E9FA9E9D9F5E344D5A9E4BCF6509A7F39789F515AB8F92DDBCBD414D940E93"
    );
    const GENERATOR: Affine<Self> = Affine::new_unchecked(
        fp_from_hex!(
            "32C4AE2C1F1981195F9904466A39C9948FE30BBFF2660BE1715A4589334C74C7"
        ),
        fp_from_hex!(
            "BC3736A2F4F6779C59BDCEE36B692153D0A9877CC62A474002DF32E52139F0A0"
        ),
    );
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    type Affine = super::Affine<Sm2Config>;
    type Projective = super::Projective<Sm2Config>;

    const ORDER: U256 = Sm2FrParam::MODULUS;

    #[test]
    fn montgomery_constants_of_the_curve_fields() {
        // R = 2^256 mod p, derivable by hand from the sparse shape of p.
        assert_eq!(
            Sm2FqParam::R,
            from_hex!("0000000100000000000000000000000000000000FFFFFFFF0000000000000001")
        );
        assert_eq!(
            Sm2FrParam::R,
            from_hex!("000000010000000000000000000000008DFC2094DE39FAD4AC440BF6C62ABEDD")
        );

        // MODULUS * INV = -1 mod 2^64 for both fields.
        assert_eq!(
            Sm2FqParam::MODULUS.as_limbs()[0].wrapping_mul(Sm2FqParam::INV),
            u64::MAX
        );
        assert_eq!(
            Sm2FrParam::MODULUS.as_limbs()[0].wrapping_mul(Sm2FrParam::INV),
            u64::MAX
        );
        assert_eq!(Sm2FrParam::INV, 0x327F9E8872350975);
    }

    #[test]
    fn scalar_field_is_smaller_than_base_field() {
        assert!(Sm2FrParam::MODULUS < Sm2FqParam::MODULUS);
    }

    #[test]
    fn generator_is_on_curve() {
        let g = Affine::generator();
        assert!(g.is_on_curve());
        assert!(!g.is_identity());

        // The checked constructors accept the standard base point.
        assert_eq!(Affine::new(g.x, g.y), g);
        let lifted = Projective::new(g.x, g.y, Fq::ONE);
        assert_eq!(lifted.to_affine(), g);
    }

    #[test]
    fn curve_equation_holds_for_generator() {
        // y² = x³ + a·x + b for the standard base point.
        let g = Affine::generator();
        let lhs = g.y * g.y;
        let rhs = g.x * g.x * g.x + Sm2Config::A * g.x + Sm2Config::B;
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn scalar_mul_known_answer() {
        // A fixed 256-bit multiple of the base point.
        let k = from_hex!(
            "6CB28D99385C175C94F94E934817663FC176D925DD72B727260DBAEA99692CFC"
        );
        let kg = Affine::generator().mul_bigint(&k).to_affine();

        assert!(kg.is_on_curve());
        assert_eq!(
            kg.x.into_bigint(),
            from_hex!("8EFFDE7BDDEB5359D6C51F4951125C4C7086B4CC8E0AEC574CCCD2F270713C17")
        );
        assert_eq!(
            kg.y.into_bigint(),
            from_hex!("9A093F4A25A718C66C2518F1FC302AC3B8E5582B13AAB2E09D85039CEE0DE3F1")
        );
    }

    #[test]
    fn affine_and_jacobian_laws_agree() {
        let g = Affine::generator();

        for k in 1u64..=20 {
            let k = U256::from(k);
            let jacobian = g.mul_bigint(&k).to_affine();
            let affine = g.mul_bigint_affine(&k);
            assert_eq!(jacobian, affine);
            assert!(jacobian.is_on_curve());
        }
    }

    #[test]
    fn point_addition() {
        let g = Affine::generator();
        let g_proj: Projective = g.into();

        // G + G = 2G, computed three ways.
        let mut doubled_proj = g_proj;
        doubled_proj.double_in_place();
        let doubled = doubled_proj.to_affine();
        assert_eq!(g.double_affine(), doubled);
        assert_eq!(g.add_affine(&g), doubled);
        let mut mixed = g_proj;
        mixed.add_assign_affine(&g);
        assert_eq!(mixed.to_affine(), doubled);

        // G + (-G) = O in both laws.
        assert!(g.add_affine(&(-g)).is_identity());
        let neg_g: Projective = (-g).into();
        assert!((g_proj + neg_g).is_identity());

        // 2G + (-G) = G.
        assert_eq!(doubled_proj + neg_g, g_proj);
    }

    #[test]
    fn addition_is_commutative_and_associative() {
        let g = Affine::generator();
        let a = g.mul_bigint(&U256::from(1234u64));
        let b = g.mul_bigint(&U256::from(5678u64));
        let c = g.mul_bigint(&U256::from(9012u64));

        assert_eq!(a + b, b + a);
        assert_eq!((a + b) + c, a + (b + c));

        let a_affine = a.to_affine();
        let b_affine = b.to_affine();
        assert_eq!(
            a_affine.add_affine(&b_affine),
            b_affine.add_affine(&a_affine)
        );
        assert_eq!((a + b).to_affine(), a_affine.add_affine(&b_affine));
    }

    #[test]
    fn multiples_of_group_order() {
        let g = Affine::generator();

        // [n]G = O under both laws, and for other points on the curve.
        assert!(g.mul_bigint(&ORDER).is_identity());
        assert!(g.mul_bigint_affine(&ORDER).is_identity());
        for k in [3u64, 41, 65537] {
            let q = g.mul_bigint(&U256::from(k)).to_affine();
            assert!(q.mul_bigint(&ORDER).is_identity());
        }

        // [n + 1]G = G.
        let order_plus_one = from_hex!(
            "FFFFFFFEFFFFFFFFFFFFFFFFFFFFFFFF7203DF6B21C6052B53BBF40939D54124"
        );
        assert_eq!(g.mul_bigint(&order_plus_one).to_affine(), g);
    }

    #[test]
    fn identity_arithmetic() {
        let g = Affine::generator();
        let g_proj: Projective = g.into();
        let id = Projective::identity();

        assert_eq!(id + g_proj, g_proj);
        assert_eq!(g_proj + id, g_proj);
        assert!(g.mul_bigint(&U256::ZERO).is_identity());

        assert_eq!(Affine::identity().add_affine(&g), g);
        assert_eq!(g.add_affine(&Affine::identity()), g);
        assert!((-Affine::identity()).is_identity());
    }
}
