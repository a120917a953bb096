//! Seedable random variates for the weather generator.
//!
//! The uniform core is a 32-bit permuted congruential generator (PCG32).
//! Normal variates use the Marsaglia polar method; the second variate of each
//! pair is cached in the stream itself, so two streams never share state.
//! Beta variates follow Cheng (1978), algorithms BB and BC.

use rand::RngCore;
use rand_pcg::Pcg32;

// Fixed PCG increment; streams differ only by their seed.
const PCG_STREAM: u64 = 0xa02b_dbf7_bb3c_0a7;

// log(f64::MAX), guard for exp() in the beta sampler
const EXP_MAX: f64 = 709.782_712_893_384;

#[derive(Clone, Debug)]
pub struct RandomStream {
    rng: Pcg32,
    cached_normal: Option<f64>,
}

impl RandomStream {
    pub fn new(seed: u64) -> Self {
        RandomStream {
            rng: Pcg32::new(seed, PCG_STREAM),
            cached_normal: None,
        }
    }

    /// Reset the stream; the same seed always reproduces the same sequence.
    pub fn seed(&mut self, seed: u64) {
        self.rng = Pcg32::new(seed, PCG_STREAM);
        self.cached_normal = None;
    }

    /// Uniform variate in [0, 1) with 32 bits of resolution.
    pub fn uniform(&mut self) -> f64 {
        f64::from(self.rng.next_u32()) * (1.0 / 4_294_967_296.0)
    }

    /// Uniform variate in [lo, hi).
    ///
    /// # Panics
    /// If `lo > hi`.
    pub fn uniform_range(&mut self, lo: f64, hi: f64) -> f64 {
        assert!(lo <= hi, "uniform_range: lo = {lo} > hi = {hi}");
        lo + (hi - lo) * self.uniform()
    }

    /// Normal variate with the given mean and standard deviation.
    ///
    /// # Panics
    /// If `sd` is negative or not finite.
    pub fn normal(&mut self, mean: f64, sd: f64) -> f64 {
        assert!(sd.is_finite() && sd >= 0.0, "normal: sd = {sd} must be >= 0");

        let gauss = match self.cached_normal.take() {
            Some(g) => g,
            None => {
                let (v1, v2, r) = loop {
                    let v1 = 2.0 * self.uniform() - 1.0;
                    let v2 = 2.0 * self.uniform() - 1.0;
                    let r = v1 * v1 + v2 * v2;
                    if r > 0.0 && r < 1.0 {
                        break (v1, v2, r);
                    }
                };
                let fac = (-2.0 * r.ln() / r).sqrt();
                self.cached_normal = Some(v1 * fac);
                v2 * fac
            }
        };

        mean + gauss * sd
    }

    /// Beta variate in (0, 1) with shape parameters `aa` and `bb`.
    ///
    /// # Panics
    /// If either shape parameter is not strictly positive.
    pub fn beta(&mut self, aa: f64, bb: f64) -> f64 {
        assert!(aa > 0.0, "beta: AA <= 0.0");
        assert!(bb > 0.0, "beta: BB <= 0.0");

        let a_min = aa.min(bb);
        if a_min <= 1.0 {
            self.beta_bc(aa, bb)
        } else {
            self.beta_bb(aa, bb)
        }
    }

    // Cheng's algorithm BC: min(aa, bb) <= 1
    fn beta_bc(&mut self, aa: f64, bb: f64) -> f64 {
        let a = aa.max(bb);
        let b = aa.min(bb);
        let alpha = a + b;
        let beta = 1.0 / b;
        let delta = 1.0 + a - b;
        let k1 = delta * (0.0138889 + 0.0416667 * b) / (a * beta - 0.777778);
        let k2 = 0.25 + (0.5 + 0.25 / delta) * b;

        let w = loop {
            let u1 = self.uniform();
            let u2 = self.uniform();
            let z;
            if u1 < 0.5 {
                let y = u1 * u2;
                z = u1 * y;
                if 0.25 * u2 + z - y >= k1 {
                    continue;
                }
            } else {
                z = u1 * u1 * u2;
                if z <= 0.25 {
                    break v_w_from(u1, beta, a).1;
                }
                if z >= k2 {
                    continue;
                }
            }
            let (v, w) = v_w_from(u1, beta, a);
            if alpha * ((alpha / (b + w)).ln() + v) - 1.3862944 >= z.ln() {
                break w;
            }
        };

        if aa == a { a / (a + w) } else { w / (a + w) }
    }

    // Cheng's algorithm BB: min(aa, bb) > 1
    fn beta_bb(&mut self, aa: f64, bb: f64) -> f64 {
        let a = aa.min(bb);
        let b = aa.max(bb);
        let alpha = a + b;
        let beta = ((alpha - 2.0) / (2.0 * a * b - alpha)).sqrt();
        let gamma = a + 1.0 / beta;

        let w = loop {
            let u1 = self.uniform();
            let u2 = self.uniform();
            let (v, w) = v_w_from(u1, beta, a);
            let z = u1 * u1 * u2;
            let r = gamma * v - 1.3862944;
            let s = a + r - w;
            if s + 2.609438 >= 5.0 * z {
                break w;
            }
            let t = z.ln();
            if s > t {
                break w;
            }
            if r + alpha * (alpha / (b + w)).ln() >= t {
                break w;
            }
        };

        if aa != a { b / (b + w) } else { w / (b + w) }
    }
}

fn v_w_from(u1: f64, beta: f64, aa: f64) -> (f64, f64) {
    let v = beta * (u1 / (1.0 - u1)).ln();
    let w = if v <= EXP_MAX {
        let w = aa * v.exp();
        if w.is_finite() { w } else { f64::MAX }
    } else {
        f64::MAX
    };
    (v, w)
}
