//! # Forward Error Correction
//!
//! Systematic Reed-Solomon over GF(256) with a run-time number of parity
//! symbols. The codeword is `message ‖ parity`, where parity is the remainder
//! of `message(x) · x^nsym` divided by
//!
//! ```text
//! g(x) = (x - α^0)(x - α^1) ... (x - α^(nsym-1))
//! ```
//!
//! Decoding corrects any mix of `e` unknown symbol errors and `f` known
//! erasures with `2e + f ≤ nsym`:
//!
//! ```text
//! syndromes ─► Forney syndromes (strip erasures) ─► Berlekamp-Massey
//!           ─► Chien search ─► Forney magnitudes ─► syndrome re-check
//! ```
//!
//! Polynomials are stored highest degree first, the same order as the
//! codeword bytes.

use crate::{Error, Gf256};

/// Maximum codeword length for 8-bit symbols.
pub const MAX_CODEWORD: usize = 255;

/// α^i for any non-negative exponent; α has order 255.
#[inline]
fn alpha_pow(i: usize) -> Gf256 {
    Gf256::GENERATOR.pow((i % 255) as u8)
}

#[inline]
fn is_zero(x: Gf256) -> bool {
    x.0 == 0
}

// =============================================================================
// Polynomial helpers
// =============================================================================

fn poly_scale(p: &[Gf256], x: Gf256) -> Vec<Gf256> {
    p.iter().map(|&c| c * x).collect()
}

fn poly_add(p: &[Gf256], q: &[Gf256]) -> Vec<Gf256> {
    let len = p.len().max(q.len());
    let mut out = vec![Gf256(0); len];
    for (i, &c) in p.iter().enumerate() {
        out[i + len - p.len()] = out[i + len - p.len()] + c;
    }
    for (i, &c) in q.iter().enumerate() {
        out[i + len - q.len()] = out[i + len - q.len()] + c;
    }
    out
}

fn poly_mul(p: &[Gf256], q: &[Gf256]) -> Vec<Gf256> {
    let mut out = vec![Gf256(0); p.len() + q.len() - 1];
    for (j, &b) in q.iter().enumerate() {
        if is_zero(b) {
            continue;
        }
        for (i, &a) in p.iter().enumerate() {
            out[i + j] = out[i + j] + a * b;
        }
    }
    out
}

/// Horner evaluation.
fn poly_eval(p: &[Gf256], x: Gf256) -> Gf256 {
    let mut y = p[0];
    for &c in &p[1..] {
        y = y * x + c;
    }
    y
}

fn bytes_eval(p: &[u8], x: Gf256) -> Gf256 {
    let mut y = Gf256(p[0]);
    for &c in &p[1..] {
        y = y * x + Gf256(c);
    }
    y
}

// =============================================================================
// Codec
// =============================================================================

/// Result of a successful decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    /// Corrected message (codeword without parity).
    pub message: Vec<u8>,
    /// Number of symbol positions that were repaired, erasures included.
    pub corrected: usize,
}

/// Reed-Solomon coder for a fixed number of parity symbols.
///
/// Holds only the generator polynomial; safe to share between threads.
#[derive(Debug, Clone)]
pub struct ReedSolomon {
    nsym: usize,
    generator: Vec<Gf256>,
}

impl ReedSolomon {
    /// Create a coder with `nsym` parity symbols.
    ///
    /// # Errors
    /// Returns `Error::ConfigurationInvalid` if `nsym >= 255` (no room left
    /// for a message symbol).
    pub fn new(nsym: usize) -> Result<Self, Error> {
        if nsym >= MAX_CODEWORD {
            return Err(Error::ConfigurationInvalid(format!(
                "{nsym} parity symbols leave no room in a {MAX_CODEWORD}-symbol codeword"
            )));
        }
        let mut generator = vec![Gf256(1)];
        for i in 0..nsym {
            generator = poly_mul(&generator, &[Gf256(1), alpha_pow(i)]);
        }
        Ok(Self { nsym, generator })
    }

    #[inline]
    pub fn nsym(&self) -> usize {
        self.nsym
    }

    /// Largest message that still fits a single codeword.
    #[inline]
    pub fn max_message_len(&self) -> usize {
        MAX_CODEWORD - self.nsym
    }

    /// Maximum number of unknown symbol errors a codeword survives.
    #[inline]
    pub fn error_capacity(&self) -> usize {
        self.nsym / 2
    }

    /// Generator polynomial coefficients, highest degree first.
    pub fn generator(&self) -> Vec<u8> {
        self.generator.iter().map(|c| c.0).collect()
    }

    /// Compute the `nsym` parity symbols for `message`.
    ///
    /// # Errors
    /// Returns `Error::ConfigurationInvalid` if `message.len() + nsym > 255`.
    pub fn parity(&self, message: &[u8]) -> Result<Vec<u8>, Error> {
        if message.len() + self.nsym > MAX_CODEWORD {
            return Err(Error::ConfigurationInvalid(format!(
                "message of {} bytes + {} parity symbols exceeds {MAX_CODEWORD}",
                message.len(),
                self.nsym
            )));
        }

        // Synthetic division by the monic generator
        let mut remainder: Vec<Gf256> = message.iter().map(|&b| Gf256(b)).collect();
        remainder.resize(message.len() + self.nsym, Gf256(0));
        for i in 0..message.len() {
            let coef = remainder[i];
            if is_zero(coef) {
                continue;
            }
            for (j, &g) in self.generator.iter().enumerate().skip(1) {
                remainder[i + j] = remainder[i + j] + g * coef;
            }
        }

        Ok(remainder[message.len()..].iter().map(|c| c.0).collect())
    }

    /// Encode `message` into `message ‖ parity`.
    pub fn encode(&self, message: &[u8]) -> Result<Vec<u8>, Error> {
        let parity = self.parity(message)?;
        let mut codeword = Vec::with_capacity(message.len() + parity.len());
        codeword.extend_from_slice(message);
        codeword.extend_from_slice(&parity);
        Ok(codeword)
    }

    /// Syndromes S_i = c(α^i), i in 0..nsym.
    fn syndromes(&self, codeword: &[u8]) -> Vec<Gf256> {
        (0..self.nsym)
            .map(|i| bytes_eval(codeword, alpha_pow(i)))
            .collect()
    }

    /// Decode a possibly corrupted codeword.
    ///
    /// `erasures` lists codeword positions known to be unreliable; their
    /// current values are ignored.
    ///
    /// # Errors
    /// Returns `Error::UncorrectableErrorBurst` when `2e + f > nsym` or the
    /// locator does not match the codeword, and `Error::ConfigurationInvalid`
    /// when the codeword is shorter than the parity or longer than 255.
    pub fn decode(&self, codeword: &[u8], erasures: &[usize]) -> Result<Correction, Error> {
        let n = codeword.len();
        if n < self.nsym || n > MAX_CODEWORD || n == 0 {
            return Err(Error::ConfigurationInvalid(format!(
                "codeword of {n} symbols does not fit {} parity symbols",
                self.nsym
            )));
        }

        let mut erasures: Vec<usize> = erasures.iter().copied().filter(|&p| p < n).collect();
        erasures.sort_unstable();
        erasures.dedup();

        let burst = Error::UncorrectableErrorBurst {
            erasures: erasures.len(),
            nsym: self.nsym,
        };
        if erasures.len() > self.nsym {
            return Err(burst);
        }

        let message_len = n - self.nsym;
        let synd = self.syndromes(codeword);
        if synd.iter().all(|&s| is_zero(s)) {
            return Ok(Correction {
                message: codeword[..message_len].to_vec(),
                corrected: 0,
            });
        }

        // Remove the erasures' contribution so Berlekamp-Massey only sees errors
        let mut forney = synd.clone();
        for &pos in &erasures {
            let x = alpha_pow(n - 1 - pos);
            for j in 0..forney.len().saturating_sub(1) {
                forney[j] = forney[j] * x + forney[j + 1];
            }
        }

        let err_loc = self.error_locator(&forney, erasures.len());
        let errors = err_loc.len() - 1;
        if errors * 2 + erasures.len() > self.nsym {
            return Err(burst);
        }

        // Chien search on the reversed locator: a root at α^i means the
        // symbol at position n-1-i is in error
        let reversed: Vec<Gf256> = err_loc.iter().rev().copied().collect();
        let error_positions: Vec<usize> = (0..n)
            .filter(|&i| is_zero(poly_eval(&reversed, alpha_pow(i))))
            .map(|i| n - 1 - i)
            .collect();
        if error_positions.len() != errors {
            return Err(burst);
        }

        let mut positions = erasures;
        positions.extend(error_positions);
        positions.sort_unstable();
        positions.dedup();

        let mut corrected = codeword.to_vec();
        self.correct_errata(&mut corrected, &synd, &positions)
            .ok_or(burst.clone())?;

        if self.syndromes(&corrected).iter().any(|&s| !is_zero(s)) {
            return Err(burst);
        }

        corrected.truncate(message_len);
        Ok(Correction {
            message: corrected,
            corrected: positions.len(),
        })
    }

    /// Berlekamp-Massey over the (Forney) syndromes.
    fn error_locator(&self, synd: &[Gf256], erase_count: usize) -> Vec<Gf256> {
        let mut err_loc = vec![Gf256(1)];
        let mut old_loc = vec![Gf256(1)];

        for k in 0..(self.nsym - erase_count) {
            let mut delta = synd[k];
            for j in 1..err_loc.len() {
                delta = delta + err_loc[err_loc.len() - 1 - j] * synd[k - j];
            }

            old_loc.push(Gf256(0));
            if !is_zero(delta) {
                if old_loc.len() > err_loc.len() {
                    let new_loc = poly_scale(&old_loc, delta);
                    old_loc = poly_scale(&err_loc, Gf256(1) / delta);
                    err_loc = new_loc;
                }
                err_loc = poly_add(&err_loc, &poly_scale(&old_loc, delta));
            }
        }

        let leading = err_loc.iter().take_while(|&&c| is_zero(c)).count();
        err_loc.drain(..leading);
        if err_loc.is_empty() {
            err_loc.push(Gf256(1));
        }
        err_loc
    }

    /// Forney algorithm: compute and apply the magnitude at every errata
    /// position. Returns `None` if a magnitude is undefined.
    fn correct_errata(&self, codeword: &mut [u8], synd: &[Gf256], positions: &[usize]) -> Option<()> {
        let n = codeword.len();
        let coef_pos: Vec<usize> = positions.iter().map(|&p| n - 1 - p).collect();

        // Errata locator Λ(x) = Π (1 + X_k·x)
        let mut locator = vec![Gf256(1)];
        for &c in &coef_pos {
            locator = poly_mul(&locator, &[alpha_pow(c), Gf256(1)]);
        }

        // Evaluator Ω(x) = S(x)·Λ(x) mod x^(ν+1), with S(x) = Σ S_i x^(i+1)
        let mut synd_poly: Vec<Gf256> = synd.iter().rev().copied().collect();
        synd_poly.push(Gf256(0));
        let product = poly_mul(&synd_poly, &locator);
        let keep = locator.len().min(product.len());
        let evaluator = &product[product.len() - keep..];

        let xs: Vec<Gf256> = coef_pos.iter().map(|&c| alpha_pow(c)).collect();
        for (i, &xi) in xs.iter().enumerate() {
            let xi_inv = Gf256(1) / xi;

            let mut denominator = Gf256(1);
            for (j, &xj) in xs.iter().enumerate() {
                if j != i {
                    denominator = denominator * (Gf256(1) + xi_inv * xj);
                }
            }
            if is_zero(denominator) {
                return None;
            }

            let numerator = poly_eval(evaluator, xi_inv) * xi;
            let magnitude = numerator / denominator;
            codeword[positions[i]] ^= magnitude.0;
        }
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 37 + 11) % 256) as u8).collect()
    }

    #[test]
    fn test_alpha_powers() {
        assert_eq!(Gf256::GENERATOR, Gf256(2));
        for i in 0..300 {
            assert_eq!(alpha_pow(i) * Gf256::GENERATOR, alpha_pow(i + 1));
        }
        assert_eq!(alpha_pow(0), Gf256(1));
        assert_eq!(alpha_pow(8), Gf256(0x1d));
        assert_eq!(alpha_pow(255), Gf256(1));

        // α generates every non-zero element
        let mut seen: Vec<u8> = (0..255).map(|i| alpha_pow(i).0).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 255);
    }

    #[test]
    fn test_generator_polynomial() {
        assert_eq!(ReedSolomon::new(2).unwrap().generator(), vec![0x01, 0x03, 0x02]);
        assert_eq!(
            ReedSolomon::new(4).unwrap().generator(),
            vec![0x01, 0x0f, 0x36, 0x78, 0x40]
        );
    }

    #[test]
    fn test_reference_parity() {
        let rs = ReedSolomon::new(4).unwrap();
        let codeword = rs.encode(&[1, 2, 3, 4]).unwrap();
        assert_eq!(codeword, vec![1, 2, 3, 4, 117, 163, 178, 96]);
    }

    #[test]
    fn test_params_invalid() {
        assert!(ReedSolomon::new(255).is_err());
        let rs = ReedSolomon::new(10).unwrap();
        assert_eq!(rs.max_message_len(), 245);
        assert!(rs.encode(&[0u8; 246]).is_err());
        assert!(rs.encode(&[0u8; 245]).is_ok());
    }

    #[test]
    fn test_clean_codeword() {
        let rs = ReedSolomon::new(10).unwrap();
        let msg = sample_message(104);
        let codeword = rs.encode(&msg).unwrap();

        let correction = rs.decode(&codeword, &[]).unwrap();
        assert_eq!(correction.message, msg);
        assert_eq!(correction.corrected, 0);
    }

    #[test]
    fn test_corrects_up_to_half_nsym_errors() {
        let rs = ReedSolomon::new(10).unwrap();
        let msg = sample_message(104);
        let codeword = rs.encode(&msg).unwrap();

        for k in 1..=rs.error_capacity() {
            let mut corrupted = codeword.clone();
            for e in 0..k {
                let pos = (e * 23 + 5) % corrupted.len();
                corrupted[pos] ^= 0x5a;
            }
            let correction = rs.decode(&corrupted, &[]).unwrap();
            assert_eq!(correction.message, msg, "failed with {k} errors");
            assert_eq!(correction.corrected, k);
        }
    }

    #[test]
    fn test_errors_in_parity_region() {
        let rs = ReedSolomon::new(6).unwrap();
        let msg = sample_message(20);
        let mut codeword = rs.encode(&msg).unwrap();
        let last = codeword.len() - 1;
        codeword[last] ^= 0xff;
        codeword[last - 2] ^= 0x01;

        assert_eq!(rs.decode(&codeword, &[]).unwrap().message, msg);
    }

    #[test]
    fn test_corrects_nsym_erasures() {
        let rs = ReedSolomon::new(8).unwrap();
        let msg = sample_message(50);
        let codeword = rs.encode(&msg).unwrap();

        let erased: Vec<usize> = (0..8).map(|i| i * 7).collect();
        let mut corrupted = codeword.clone();
        for &p in &erased {
            corrupted[p] = 0;
        }

        let correction = rs.decode(&corrupted, &erased).unwrap();
        assert_eq!(correction.message, msg);
    }

    #[test]
    fn test_mixed_errors_and_erasures() {
        let rs = ReedSolomon::new(10).unwrap();
        let msg = sample_message(80);
        let codeword = rs.encode(&msg).unwrap();

        // 2 errors + 6 erasures: 2*2 + 6 = 10
        let mut corrupted = codeword.clone();
        corrupted[3] ^= 0x11;
        corrupted[60] ^= 0x80;
        let erased = [10, 11, 12, 40, 85, 89];
        for &p in &erased {
            corrupted[p] = 0xee;
        }

        let correction = rs.decode(&corrupted, &erased).unwrap();
        assert_eq!(correction.message, msg);
    }

    #[test]
    fn test_too_many_erasures() {
        let rs = ReedSolomon::new(4).unwrap();
        let codeword = rs.encode(&sample_message(10)).unwrap();
        let result = rs.decode(&codeword, &[0, 1, 2, 3, 4]);
        assert!(matches!(
            result,
            Err(Error::UncorrectableErrorBurst { erasures: 5, nsym: 4 })
        ));
    }

    #[test]
    fn test_beyond_bound_never_returns_original() {
        let rs = ReedSolomon::new(4).unwrap();
        let msg = sample_message(30);
        let codeword = rs.encode(&msg).unwrap();

        // 3 errors with distance-5 code: either detected, or decoded to a
        // different codeword
        let mut corrupted = codeword.clone();
        corrupted[1] ^= 0x01;
        corrupted[9] ^= 0x02;
        corrupted[17] ^= 0x04;

        match rs.decode(&corrupted, &[]) {
            Err(Error::UncorrectableErrorBurst { .. }) => {}
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(correction) => assert_ne!(correction.message, msg),
        }
    }

    #[test]
    fn test_zero_parity_passthrough() {
        let rs = ReedSolomon::new(0).unwrap();
        let msg = sample_message(12);
        let codeword = rs.encode(&msg).unwrap();
        assert_eq!(codeword, msg);
        assert_eq!(rs.decode(&codeword, &[]).unwrap().message, msg);
    }

    #[test]
    fn test_full_length_codeword() {
        let rs = ReedSolomon::new(16).unwrap();
        let msg = sample_message(239);
        let mut codeword = rs.encode(&msg).unwrap();
        assert_eq!(codeword.len(), 255);

        codeword[0] ^= 0x33;
        codeword[254] ^= 0x44;
        codeword[128] ^= 0x55;
        assert_eq!(rs.decode(&codeword, &[]).unwrap().message, msg);
    }
}
