//! This module contains an implementation of the SM2 digital signature
//! algorithm, including key generation, signing, and signature verification.
//!
//! The signature scheme works over any [`CurveConfig`]; the curve
//! recommended by GB/T 32918 is the default instance, used by
//! [`Sm2Engine`] and the `Sm2*` type aliases.
//!
//! Message hashing uses SM3. The digest input is either the bare message or
//! `ZA || message` when a caller-supplied user-identifier digest is present;
//! see [`message_digest`].

use core::fmt;

use educe::Educe;
use rand::TryCryptoRng;
use sm3::{Digest, Sm3};
use zeroize::Zeroize;

use crate::{
    arithmetic::U256,
    curve::{Affine, CurveConfig, ScalarField, Sm2Config},
    field::{Fp, FpParams},
};

/// SM2 signing key on the GB/T 32918 recommended curve.
pub type Sm2SigningKey = SigningKey<Sm2Config>;
/// SM2 verifying key on the GB/T 32918 recommended curve.
pub type Sm2VerifyingKey = VerifyingKey<Sm2Config>;
/// SM2 signature on the GB/T 32918 recommended curve.
pub type Sm2Signature = Signature<Sm2Config>;

/// How many times signing resamples the nonce before giving up.
///
/// A single retry already has probability on the order of `2^-256`; a bound
/// this size is indistinguishable from retrying forever, but turns a broken
/// random source into an error instead of a hang.
const MAX_SIGN_ATTEMPTS: usize = 255;

/// Errors produced by the signature engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The operation requires a key pair that has not been installed.
    KeyMissing,
    /// The random number generator failed to produce output.
    RngFailure,
    /// The random number generator kept producing unusable values.
    RngExhaustion,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::KeyMissing => "no key pair has been installed",
            Error::RngFailure => "random number generator failure",
            Error::RngExhaustion => "random number generator retries exhausted",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}

/// Computes the 32-byte SM3 digest that a signature covers.
///
/// With `za` present, the digest input is `ZA || msg` as specified by
/// GB/T 32918.2, where `ZA` is the 32-byte user-identifier digest. Without
/// it, the bare message is hashed; signatures in the two modes are not
/// interchangeable, so signer and verifier must agree on one.
#[must_use]
pub fn message_digest(za: Option<&[u8; 32]>, msg: &[u8]) -> [u8; 32] {
    let mut hasher = Sm3::new();
    if let Some(za) = za {
        hasher.update(za);
    }
    hasher.update(msg);
    hasher.finalize().into()
}

/// Interprets a digest as a big-endian integer reduced into the scalar
/// field, substituting `1` for `0`.
///
/// The zero substitution keeps the signing equation away from `e = 0`, and
/// is applied identically on the signing and verification paths.
fn scalar_from_prehash<C: CurveConfig>(prehash: &[u8; 32]) -> ScalarField<C> {
    let e = ScalarField::<C>::new(U256::from_bytes_be(prehash));
    if e.is_zero() {
        ScalarField::<C>::ONE
    } else {
        e
    }
}

/// Draws a uniformly distributed scalar in `[1, n - 1]` by rejection
/// sampling.
///
/// Only cryptographically strong generators satisfy the [`TryCryptoRng`]
/// bound. Generator failures surface as [`Error::RngFailure`].
fn sample_nonzero_scalar<P, R>(rng: &mut R) -> Result<Fp<P>, Error>
where
    P: FpParams,
    R: TryCryptoRng + ?Sized,
{
    for _ in 0..MAX_SIGN_ATTEMPTS {
        let mut bytes = [0u8; 32];
        rng.try_fill_bytes(&mut bytes).map_err(|_| Error::RngFailure)?;

        let candidate = U256::from_bytes_be(&bytes);
        if !candidate.is_zero() && candidate < P::MODULUS {
            return Ok(Fp::new(candidate));
        }
    }
    Err(Error::RngExhaustion)
}

/// An SM2 signature, i.e. a pair of scalars `(r, s)`.
///
/// Both components are nonzero modulo the group order by construction;
/// encodings of zero or anything not below the group order are rejected at
/// parse time.
///
/// Serialized as fixed-size big-endian `r || s` with no added framing.
#[derive(Educe)]
#[educe(Copy, Clone, PartialEq, Eq)]
pub struct Signature<C: CurveConfig> {
    r: ScalarField<C>,
    s: ScalarField<C>,
}

impl<C: CurveConfig> Signature<C> {
    /// Creates a signature from its two scalar components, rejecting zero
    /// components.
    #[must_use]
    pub fn from_scalars(
        r: ScalarField<C>,
        s: ScalarField<C>,
    ) -> Option<Self> {
        (!r.is_zero() && !s.is_zero()).then_some(Self { r, s })
    }

    /// Parses a signature from big-endian `r || s` bytes.
    ///
    /// Each component must be in `[1, n - 1]`; encodings of `0`, of the
    /// group order, or of anything larger are rejected rather than reduced.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 64]) -> Option<Self> {
        let r = U256::from_bytes_be(&bytes[..32]);
        let s = U256::from_bytes_be(&bytes[32..]);

        let in_range = |uint: &U256| {
            !uint.is_zero() && *uint < <C::ScalarParams as FpParams>::MODULUS
        };
        (in_range(&r) && in_range(&s))
            .then(|| Self { r: Fp::new(r), s: Fp::new(s) })
    }

    /// Serializes the signature as big-endian `r || s`.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r.into_bigint().to_bytes_be());
        bytes[32..].copy_from_slice(&self.s.into_bigint().to_bytes_be());
        bytes
    }

    /// The `r` component.
    pub fn r(&self) -> &ScalarField<C> {
        &self.r
    }

    /// The `s` component.
    pub fn s(&self) -> &ScalarField<C> {
        &self.s
    }
}

impl<C: CurveConfig> fmt::Debug for Signature<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(")?;
        for byte in self.to_bytes() {
            write!(f, "{byte:02X}")?;
        }
        write!(f, ")")
    }
}

impl<C: CurveConfig> fmt::Display for Signature<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:X}")
    }
}

impl<C: CurveConfig> fmt::LowerHex for Signature<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.to_bytes() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl<C: CurveConfig> fmt::UpperHex for Signature<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.to_bytes() {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

/// An SM2 signing key.
///
/// Holds the secret scalar `d` in `[1, n - 1]`, the per-key constant
/// `(1 + d)^{-1} mod n` reused across signatures, and the derived
/// [`VerifyingKey`]. The public point is always the key's own multiple of
/// the base point, so the signer cannot be tricked into signing under a
/// mismatched public key.
#[derive(Educe)]
#[educe(Clone, PartialEq, Eq)]
pub struct SigningKey<C: CurveConfig> {
    /// The secret scalar `d`.
    secret: ScalarField<C>,
    /// `(1 + d)^{-1} mod n`, the fixed denominator of the `s` computation.
    denom_inv: ScalarField<C>,
    /// The public half of this signing key.
    verifying_key: VerifyingKey<C>,
}

impl<C: CurveConfig> SigningKey<C> {
    /// Generates a fresh key pair, drawing the secret scalar uniformly from
    /// `[1, n - 1]`.
    pub fn random<R: TryCryptoRng + ?Sized>(
        rng: &mut R,
    ) -> Result<Self, Error> {
        for _ in 0..MAX_SIGN_ATTEMPTS {
            let d = sample_nonzero_scalar(rng)?;
            // `1 + d = 0` has a single bad scalar; resample rather than
            // hand out a key that cannot sign.
            if let Some(key) = Self::from_scalar(d) {
                return Ok(key);
            }
        }
        Err(Error::RngExhaustion)
    }

    /// Builds a signing key from the secret scalar `d`.
    ///
    /// Returns `None` for the two degenerate scalars: zero, and the one
    /// where `1 + d` vanishes modulo the group order.
    #[must_use]
    pub fn from_scalar(d: ScalarField<C>) -> Option<Self> {
        if d.is_zero() {
            return None;
        }
        let denom_inv = (ScalarField::<C>::ONE + d).inverse()?;

        let point =
            Affine::<C>::generator().mul_bigint(&d.into_bigint()).to_affine();
        Some(Self {
            secret: d,
            denom_inv,
            verifying_key: VerifyingKey { point },
        })
    }

    /// Parses a signing key from the big-endian encoding of `d`.
    ///
    /// The encoding must be in `[1, n - 1]`; out-of-range values are
    /// rejected rather than reduced.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        let d = U256::from_bytes_be(bytes);
        if d.is_zero() || d >= <C::ScalarParams as FpParams>::MODULUS {
            return None;
        }
        Self::from_scalar(Fp::new(d))
    }

    /// Serializes the secret scalar `d` as big-endian bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.secret.into_bigint().to_bytes_be()
    }

    /// Gets the [`VerifyingKey`] for this [`SigningKey`].
    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKey<C> {
        &self.verifying_key
    }

    /// Signs a message, hashing it with bare SM3.
    ///
    /// For the `ZA || M` hashing mode, combine [`message_digest`] with
    /// [`Self::sign_prehash`].
    pub fn sign<R: TryCryptoRng + ?Sized>(
        &self,
        rng: &mut R,
        msg: &[u8],
    ) -> Result<Signature<C>, Error> {
        self.sign_prehash(rng, &message_digest(None, msg))
    }

    /// Signs a precomputed 32-byte message digest.
    ///
    /// Draws a fresh nonce `k` per attempt and retries on the degenerate
    /// outcomes `r = 0`, `r + k = n`, and `s = 0`, so a returned signature
    /// always has both components in `[1, n - 1]`.
    pub fn sign_prehash<R: TryCryptoRng + ?Sized>(
        &self,
        rng: &mut R,
        prehash: &[u8; 32],
    ) -> Result<Signature<C>, Error> {
        let e = scalar_from_prehash::<C>(prehash);

        for _ in 0..MAX_SIGN_ATTEMPTS {
            let k: ScalarField<C> = sample_nonzero_scalar(rng)?;

            // (x1, _) = [k]G. The nonce is below the group order, so the
            // multiple is never the identity.
            let kg = Affine::<C>::generator()
                .mul_bigint(&k.into_bigint())
                .to_affine();
            let Some((x1, _)) = kg.xy() else {
                continue;
            };

            // r = e + x1 mod n
            let r = e + ScalarField::<C>::new(x1.into_bigint());
            if r.is_zero() || (r + k).is_zero() {
                continue;
            }

            // s = (1 + d)^{-1} · (k - r·d) mod n
            let s = self.denom_inv * (k - r * self.secret);
            if s.is_zero() {
                continue;
            }

            return Ok(Signature { r, s });
        }
        Err(Error::RngExhaustion)
    }
}

impl<C: CurveConfig> Zeroize for SigningKey<C> {
    fn zeroize(&mut self) {
        self.secret.zeroize();
        self.denom_inv.zeroize();
    }
}

/// An SM2 verifying (public) key.
#[derive(Educe)]
#[educe(Copy, Clone, PartialEq, Eq)]
pub struct VerifyingKey<C: CurveConfig> {
    /// The public point `P = [d]G`.
    point: Affine<C>,
}

impl<C: CurveConfig> VerifyingKey<C> {
    /// Builds a verifying key from an affine point.
    ///
    /// The point must be on the curve and not the identity. The curves
    /// served here have prime group order, so every other curve point is a
    /// generator multiple.
    #[must_use]
    pub fn from_affine(point: Affine<C>) -> Option<Self> {
        (!point.is_identity() && point.is_on_curve())
            .then_some(Self { point })
    }

    /// The affine public point.
    #[must_use]
    pub fn as_affine(&self) -> &Affine<C> {
        &self.point
    }

    /// Verifies a signature over a message hashed with bare SM3.
    #[must_use]
    pub fn verify(&self, msg: &[u8], signature: &Signature<C>) -> bool {
        self.verify_prehash(&message_digest(None, msg), signature)
    }

    /// Verifies a signature over a precomputed 32-byte message digest.
    ///
    /// Total on all inputs: out-of-range or degenerate signature data makes
    /// the verdict `false` before any curve arithmetic is done.
    #[must_use]
    pub fn verify_prehash(
        &self,
        prehash: &[u8; 32],
        signature: &Signature<C>,
    ) -> bool {
        let (r, s) = (signature.r, signature.s);
        if r.is_zero() || s.is_zero() {
            return false;
        }

        // t = r + s mod n
        let t = r + s;
        if t.is_zero() {
            return false;
        }

        let e = scalar_from_prehash::<C>(prehash);

        // (x1, _) = [s]G + [t]P
        let sum = Affine::<C>::generator().mul_bigint(&s.into_bigint())
            + self.point.mul_bigint(&t.into_bigint());
        let Some((x1, _)) = sum.to_affine().xy() else {
            return false;
        };

        // Accept iff e + x1 mod n == r.
        r == e + ScalarField::<C>::new(x1.into_bigint())
    }
}

impl<C: CurveConfig> fmt::Debug for VerifyingKey<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerifyingKey({:?})", self.point)
    }
}

/// A stateful SM2 engine on the GB/T 32918 recommended curve.
///
/// The engine starts without keys. [`Sm2Engine::create_key_pair`] installs
/// a fresh pair, after which the engine stays keyed for its lifetime;
/// signing and verification before that fail with [`Error::KeyMissing`].
#[derive(Clone, Default)]
pub struct Sm2Engine {
    key_pair: Option<Sm2SigningKey>,
}

impl Sm2Engine {
    /// Creates an engine with no keys installed.
    #[must_use]
    pub fn new() -> Self {
        Self { key_pair: None }
    }

    /// Generates and installs a fresh key pair, returning a reference to it.
    pub fn create_key_pair<R: TryCryptoRng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<&Sm2SigningKey, Error> {
        let key = SigningKey::random(rng)?;
        Ok(self.key_pair.insert(key))
    }

    /// The installed signing key, if any.
    #[must_use]
    pub fn signing_key(&self) -> Option<&Sm2SigningKey> {
        self.key_pair.as_ref()
    }

    /// The installed verifying key, if any.
    #[must_use]
    pub fn verifying_key(&self) -> Option<&Sm2VerifyingKey> {
        self.key_pair.as_ref().map(SigningKey::verifying_key)
    }

    /// Signs a message with the installed key.
    pub fn sign<R: TryCryptoRng + ?Sized>(
        &self,
        rng: &mut R,
        msg: &[u8],
    ) -> Result<Sm2Signature, Error> {
        self.key_pair.as_ref().ok_or(Error::KeyMissing)?.sign(rng, msg)
    }

    /// Verifies a signature against the installed public key.
    ///
    /// An invalid signature is an `Ok(false)` verdict; the error case is
    /// reserved for a missing key.
    pub fn verify(
        &self,
        msg: &[u8],
        signature: &Sm2Signature,
    ) -> Result<bool, Error> {
        let key = self.key_pair.as_ref().ok_or(Error::KeyMissing)?;
        Ok(key.verifying_key().verify(msg, signature))
    }
}
