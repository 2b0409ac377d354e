use {
    rand::Rng,
    rand_distr::{
        Distribution,
        Normal,
        NormalError,
    },
};

/// Zero-mean Gaussian exploration noise.
///
/// Unlike an Ornstein-Uhlenbeck process this noise has no state, every call
/// to [`sample`](Self::sample) draws independent values.
#[derive(Clone, Copy, Debug)]
pub struct GaussianNoise {
    std_dev: f64,
    normal: Normal<f64>,
}
impl GaussianNoise {
    pub fn new(std_dev: f64) -> Result<Self, NormalError> {
        Ok(Self {
            std_dev,
            normal: Normal::new(0.0, std_dev)?,
        })
    }

    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }

    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        size: usize,
    ) -> Vec<f64> {
        (0..size).map(|_| self.normal.sample(rng)).collect()
    }
}
