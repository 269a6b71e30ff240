use crate::Error;

/// Smoothed Heaviside projection around the threshold `eta`.
///
/// ```text
/// (tanh(beta * eta) + tanh(beta * (x - eta))) / (tanh(beta * eta) + tanh(beta * (1 - eta)))
/// ```
///
/// `beta = 0` is the identity and `beta = inf` is the hard step `x > eta`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TanhProjection {
    eta: f64,
    beta: f64,
}

impl TanhProjection {
    pub fn new(eta: f64, beta: f64) -> Result<Self, Error> {
        if !(0.0..=1.0).contains(&eta) || beta.is_nan() || beta < 0.0 {
            return Err(Error::InvalidProjection { eta, beta });
        }
        Ok(Self { eta, beta })
    }

    pub fn eta(&self) -> f64 {
        self.eta
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    fn denominator(&self) -> f64 {
        (self.beta * self.eta).tanh() + (self.beta * (1.0 - self.eta)).tanh()
    }

    pub fn project(&self, x: f64) -> f64 {
        if self.beta == 0.0 {
            x.clamp(0.0, 1.0)
        }
        else if self.beta.is_infinite() {
            // the gradient of the limit is not usable, see `derivative`
            if x > self.eta { 1.0 } else { 0.0 }
        }
        else {
            let numerator = (self.beta * self.eta).tanh() + (self.beta * (x - self.eta)).tanh();
            (numerator / self.denominator()).clamp(0.0, 1.0)
        }
    }

    /// `d project(x) / dx`
    pub fn derivative(&self, x: f64) -> f64 {
        if self.beta == 0.0 {
            1.0
        }
        else if self.beta.is_infinite() {
            0.0
        }
        else {
            let sech2 = 1.0 - (self.beta * (x - self.eta)).tanh().powi(2);
            self.beta * sech2 / self.denominator()
        }
    }
}
