//! Dense statevector arithmetic.

use rand::Rng;
use std::fmt;
use std::ops::{Add, Mul};

/// Amplitudes with a magnitude at or below this count as zero.
pub(crate) const EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    pub real: f64,
    pub imaginary: f64,
}

impl Complex {
    pub const ZERO: Complex = Complex::new(0.0, 0.0);
    pub const ONE: Complex = Complex::new(1.0, 0.0);

    pub const fn new(real: f64, imaginary: f64) -> Self {
        Self { real, imaginary }
    }

    /// `e^{iθ}`
    pub fn phase(theta: f64) -> Self {
        Self::new(theta.cos(), theta.sin())
    }

    pub fn conj(self) -> Self {
        Self::new(self.real, -self.imaginary)
    }

    pub fn norm_sqr(self) -> f64 {
        self.real * self.real + self.imaginary * self.imaginary
    }

    pub fn magnitude(self) -> f64 {
        self.norm_sqr().sqrt()
    }

    fn scale(self, factor: f64) -> Self {
        Self::new(self.real * factor, self.imaginary * factor)
    }
}

impl Add for Complex {
    type Output = Complex;

    fn add(self, rhs: Complex) -> Complex {
        Complex::new(self.real + rhs.real, self.imaginary + rhs.imaginary)
    }
}

impl Mul for Complex {
    type Output = Complex;

    fn mul(self, rhs: Complex) -> Complex {
        Complex::new(
            self.real * rhs.real - self.imaginary * rhs.imaginary,
            self.real * rhs.imaginary + self.imaginary * rhs.real,
        )
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Avoid printing "-0.0000".
        let clean = |v: f64| if v.abs() < 5e-5 { 0.0 } else { v };
        let (re, im) = (clean(self.real), clean(self.imaginary));
        let sign = if im < 0.0 { '-' } else { '+' };
        write!(f, "{re:.4} {sign} {:.4}i", im.abs())
    }
}

/// A single-qubit unitary, row major.
pub(crate) type Matrix = [[Complex; 2]; 2];

pub(crate) fn dagger(m: &Matrix) -> Matrix {
    [
        [m[0][0].conj(), m[1][0].conj()],
        [m[0][1].conj(), m[1][1].conj()],
    ]
}

/// One matrix applied to `target` when every control qubit is 1.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Op {
    pub matrix: Matrix,
    pub controls: Vec<usize>,
    pub target: usize,
}

impl Op {
    pub fn inverse(&self) -> Op {
        Op {
            matrix: dagger(&self.matrix),
            controls: self.controls.clone(),
            target: self.target,
        }
    }
}

/// Amplitudes of an `n`-qubit register.
#[derive(Debug, Clone, PartialEq)]
pub struct Statevector {
    pub num_qubits: usize,
    pub amplitudes: Vec<Complex>,
}

impl Statevector {
    /// The all-zero basis state.
    pub fn zero(num_qubits: usize) -> Self {
        let mut amplitudes = vec![Complex::ZERO; 1 << num_qubits];
        amplitudes[0] = Complex::ONE;
        Self {
            num_qubits,
            amplitudes,
        }
    }

    pub fn num_states(&self) -> usize {
        self.amplitudes.len()
    }

    pub(crate) fn apply(&mut self, op: &Op) {
        let target = 1usize << op.target;
        let control_mask = op.controls.iter().fold(0usize, |mask, &c| mask | (1 << c));
        for i in 0..self.amplitudes.len() {
            if i & target != 0 || i & control_mask != control_mask {
                continue;
            }
            let j = i | target;
            let (a0, a1) = (self.amplitudes[i], self.amplitudes[j]);
            self.amplitudes[i] = op.matrix[0][0] * a0 + op.matrix[0][1] * a1;
            self.amplitudes[j] = op.matrix[1][0] * a0 + op.matrix[1][1] * a1;
        }
    }

    /// Probability of reading 1 on `qubit`.
    pub(crate) fn probability_of_one(&self, qubit: usize) -> f64 {
        let bit = 1usize << qubit;
        self.amplitudes
            .iter()
            .enumerate()
            .filter(|(i, _)| i & bit != 0)
            .map(|(_, a)| a.norm_sqr())
            .sum()
    }

    /// Measure `qubit`, collapsing the state, and return the outcome.
    pub(crate) fn measure<R: Rng>(&mut self, qubit: usize, rng: &mut R) -> bool {
        let p_one = self.probability_of_one(qubit).clamp(0.0, 1.0);
        let outcome = rng.gen::<f64>() < p_one;
        let kept = if outcome { p_one } else { 1.0 - p_one };
        let norm = if kept > 0.0 { 1.0 / kept.sqrt() } else { 0.0 };
        let bit = 1usize << qubit;
        for (i, amplitude) in self.amplitudes.iter_mut().enumerate() {
            *amplitude = if (i & bit != 0) == outcome {
                amplitude.scale(norm)
            } else {
                Complex::ZERO
            };
        }
        outcome
    }

    /// Sub-state over `qubits`: amplitudes of basis states that agree on the
    /// selected qubits are summed.
    pub(crate) fn project(&self, qubits: &[usize]) -> Statevector {
        let mut amplitudes = vec![Complex::ZERO; 1 << qubits.len()];
        for (i, amplitude) in self.amplitudes.iter().enumerate() {
            let index = qubits
                .iter()
                .enumerate()
                .fold(0usize, |acc, (j, &q)| acc | (((i >> q) & 1) << j));
            amplitudes[index] = amplitudes[index] + *amplitude;
        }
        Statevector {
            num_qubits: qubits.len(),
            amplitudes,
        }
    }

    pub(crate) fn nonzero_count(&self) -> usize {
        self.amplitudes
            .iter()
            .filter(|a| a.magnitude() > EPSILON)
            .count()
    }
}

/// Whether the two-qubit state `sv` can only be read as correlated pairs.
pub(crate) fn pair_is_entangled(sv: &Statevector) -> bool {
    let possible = |i: usize| sv.amplitudes[i].magnitude() > 1e-4;
    let (b00, b01, b10, b11) = (possible(0), possible(1), possible(2), possible(3));
    (b00 && b11 && !(b01 && b10)) || (b01 && b10 && !(b00 && b11))
}

pub(crate) mod gates {
    use super::{Complex, Matrix};
    use std::f64::consts::FRAC_1_SQRT_2;

    const O: Complex = Complex::ZERO;
    const I: Complex = Complex::ONE;

    pub const X: Matrix = [[O, I], [I, O]];
    pub const Y: Matrix = [[O, Complex::new(0.0, -1.0)], [Complex::new(0.0, 1.0), O]];
    pub const Z: Matrix = [[I, O], [O, Complex::new(-1.0, 0.0)]];
    pub const H: Matrix = [
        [Complex::new(FRAC_1_SQRT_2, 0.0), Complex::new(FRAC_1_SQRT_2, 0.0)],
        [Complex::new(FRAC_1_SQRT_2, 0.0), Complex::new(-FRAC_1_SQRT_2, 0.0)],
    ];
    pub const ID: Matrix = [[I, O], [O, I]];

    pub fn phase(lambda: f64) -> Matrix {
        [[I, O], [O, Complex::phase(lambda)]]
    }

    pub fn rx(theta: f64) -> Matrix {
        let (c, s) = ((theta / 2.0).cos(), (theta / 2.0).sin());
        [
            [Complex::new(c, 0.0), Complex::new(0.0, -s)],
            [Complex::new(0.0, -s), Complex::new(c, 0.0)],
        ]
    }

    pub fn ry(theta: f64) -> Matrix {
        let (c, s) = ((theta / 2.0).cos(), (theta / 2.0).sin());
        [
            [Complex::new(c, 0.0), Complex::new(-s, 0.0)],
            [Complex::new(s, 0.0), Complex::new(c, 0.0)],
        ]
    }

    pub fn rz(theta: f64) -> Matrix {
        [[Complex::phase(-theta / 2.0), O], [O, Complex::phase(theta / 2.0)]]
    }

    pub fn u3(theta: f64, phi: f64, lambda: f64) -> Matrix {
        let (c, s) = ((theta / 2.0).cos(), (theta / 2.0).sin());
        [
            [Complex::new(c, 0.0), Complex::phase(lambda) * Complex::new(-s, 0.0)],
            [
                Complex::phase(phi) * Complex::new(s, 0.0),
                Complex::phase(phi + lambda) * Complex::new(c, 0.0),
            ],
        ]
    }
}
