//! Synthetic readout-error channel for tests and benchmarks
//!
//! Models assignment error only: each qubit's classical readout flips
//! independently with direction-dependent probabilities. Provides exact
//! (infinite-shot) distortion and seeded finite-shot sampling, plus
//! generators for the calibration datasets the calibrators consume.

use crate::counts::{self, Counts};
use crate::linalg;
use ndarray::{arr2, Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Single-qubit readout flip probabilities
#[derive(Debug, Clone, Copy)]
pub struct QubitReadoutError {
    /// P(read 1 | prepared 0)
    pub p0_to_1: f64,
    /// P(read 0 | prepared 1)
    pub p1_to_0: f64,
}

impl Default for QubitReadoutError {
    fn default() -> Self {
        // typical superconducting-hardware rates
        Self {
            p0_to_1: 0.015,
            p1_to_0: 0.025,
        }
    }
}

impl QubitReadoutError {
    /// Equal flip probability in both directions
    pub fn symmetric(p: f64) -> Self {
        Self {
            p0_to_1: p,
            p1_to_0: p,
        }
    }

    /// Local 2x2 assignment matrix, columns indexed by prepared state
    pub fn matrix(&self) -> Array2<f64> {
        arr2(&[
            [1.0 - self.p0_to_1, self.p1_to_0],
            [self.p0_to_1, 1.0 - self.p1_to_0],
        ])
    }
}

/// Independent per-qubit readout-error channel.
///
/// Qubit 0 owns the leftmost label character, matching the calibrators'
/// basis convention.
#[derive(Debug, Clone)]
pub struct ReadoutErrorModel {
    rates: Vec<QubitReadoutError>,
}

impl ReadoutErrorModel {
    pub fn from_rates(rates: Vec<QubitReadoutError>) -> Self {
        Self { rates }
    }

    /// Same flip rates on every qubit
    pub fn uniform(n_qubits: usize, rates: QubitReadoutError) -> Self {
        Self {
            rates: vec![rates; n_qubits],
        }
    }

    /// Noiseless channel
    pub fn ideal(n_qubits: usize) -> Self {
        Self::uniform(n_qubits, QubitReadoutError::symmetric(0.0))
    }

    pub fn n_qubits(&self) -> usize {
        self.rates.len()
    }

    pub fn dimension(&self) -> usize {
        1usize << self.rates.len()
    }

    pub fn single_qubit_matrix(&self, qubit: usize) -> Array2<f64> {
        self.rates[qubit].matrix()
    }

    /// The single-qubit partition matching this model's qubit order
    pub fn qubit_pattern(&self) -> Vec<Vec<usize>> {
        (0..self.rates.len()).map(|q| vec![q]).collect()
    }

    /// Materialized `2^n x 2^n` assignment matrix. Test helper; the channel
    /// itself never needs it.
    pub fn assignment_matrix(&self) -> Array2<f64> {
        let mut matrix = Array2::eye(1);
        for rate in &self.rates {
            matrix = kron(&matrix, &rate.matrix());
        }
        matrix
    }

    /// Exact action of the channel on an ideal distribution
    pub fn distort(&self, ideal: ArrayView1<f64>) -> Array1<f64> {
        let dim = self.dimension();
        debug_assert_eq!(ideal.len(), dim);
        let mut vector = ideal.to_owned();
        let mut dim_left = 1;
        for rate in &self.rates {
            let dim_right = dim / (dim_left * 2);
            vector = linalg::apply_factor(vector.view(), rate.matrix().view(), dim_left, dim_right);
            dim_left *= 2;
        }
        vector
    }

    /// Expected distorted counts for an ideal distribution rescaled to
    /// `shots` total observations
    pub fn measure(&self, ideal: ArrayView1<f64>, shots: f64) -> Counts {
        let total = ideal.sum();
        let scale = if total > 0.0 { shots / total } else { 0.0 };
        let distorted = self.distort(ideal);
        counts::vector_to_counts(distorted.mapv(|v| v * scale).view(), self.n_qubits())
    }

    /// Finite-shot noisy measurement of an ideal distribution
    pub fn sample(&self, ideal: ArrayView1<f64>, shots: usize, seed: Option<u64>) -> Counts {
        let total = ideal.sum();
        let distorted = self.distort(ideal);
        let probabilities = if total > 0.0 {
            distorted.mapv(|v| v / total)
        } else {
            distorted
        };
        ShotSampler::new(seed).sample(probabilities.view(), shots, self.n_qubits())
    }

    /// Calibration dataset for the complete calibrator: all `2^n` basis
    /// preparations with expected counts, no sampling noise
    pub fn complete_calibration_counts(
        &self,
        shots: f64,
    ) -> (Vec<String>, HashMap<String, Counts>) {
        let n_qubits = self.n_qubits();
        let labels: Vec<String> = (0..self.dimension())
            .map(|state| counts::index_to_label(state, n_qubits))
            .collect();
        let counts_by_label = labels
            .iter()
            .enumerate()
            .map(|(state, label)| (label.clone(), self.prepared_counts(state, shots)))
            .collect();
        (labels, counts_by_label)
    }

    /// Calibration dataset for a per-qubit tensored fit: joint all-0 and
    /// all-1 preparations with expected counts
    pub fn tensored_calibration_counts(
        &self,
        shots: f64,
    ) -> (Vec<String>, HashMap<String, Counts>) {
        let n_qubits = self.n_qubits();
        debug_assert!(n_qubits > 0);
        let labels = vec!["0".repeat(n_qubits), "1".repeat(n_qubits)];
        let counts_by_label = [
            (labels[0].clone(), self.prepared_counts(0, shots)),
            (
                labels[1].clone(),
                self.prepared_counts(self.dimension() - 1, shots),
            ),
        ]
        .into();
        (labels, counts_by_label)
    }

    fn prepared_counts(&self, state: usize, shots: f64) -> Counts {
        let mut ideal = Array1::zeros(self.dimension());
        ideal[state] = shots;
        self.measure(ideal.view(), shots)
    }
}

fn kron(a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    let (ar, ac) = a.dim();
    let (br, bc) = b.dim();
    let mut out = Array2::zeros((ar * br, ac * bc));
    for i in 0..ar {
        for j in 0..ac {
            for k in 0..br {
                for l in 0..bc {
                    out[[i * br + k, j * bc + l]] = a[[i, j]] * b[[k, l]];
                }
            }
        }
    }
    out
}

/// Draws finite-shot counts from a probability distribution
#[derive(Debug)]
pub struct ShotSampler {
    rng: StdRng,
}

impl ShotSampler {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Draw `shots` states and tally them as a counts mapping
    pub fn sample(
        &mut self,
        probabilities: ArrayView1<f64>,
        shots: usize,
        n_qubits: usize,
    ) -> Counts {
        let mut counts = Counts::new();
        for _ in 0..shots {
            let roll: f64 = self.rng.gen();
            let mut cumulative = 0.0;
            let mut state = probabilities.len() - 1;
            for (i, &p) in probabilities.iter().enumerate() {
                cumulative += p;
                if roll < cumulative {
                    state = i;
                    break;
                }
            }
            *counts
                .entry(counts::index_to_label(state, n_qubits))
                .or_insert(0.0) += 1.0;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complete::CompleteCalibration;
    use crate::tensored::TensoredCalibration;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    #[test]
    fn test_default_rates() {
        let rates = QubitReadoutError::default();
        assert_eq!(rates.p0_to_1, 0.015);
        assert_eq!(rates.p1_to_0, 0.025);
    }

    #[test]
    fn test_single_qubit_matrix_is_stochastic() {
        let matrix = QubitReadoutError {
            p0_to_1: 0.1,
            p1_to_0: 0.3,
        }
        .matrix();
        assert_abs_diff_eq!(matrix.column(0).sum(), 1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(matrix.column(1).sum(), 1.0, epsilon = 1e-15);
        assert_eq!(matrix[[1, 0]], 0.1);
        assert_eq!(matrix[[0, 1]], 0.3);
    }

    #[test]
    fn test_ideal_channel_is_identity() {
        let model = ReadoutErrorModel::ideal(3);
        let ideal = arr1(&[0.0, 10.0, 0.0, 30.0, 0.0, 0.0, 60.0, 0.0]);
        let distorted = model.distort(ideal.view());
        for i in 0..8 {
            assert_abs_diff_eq!(distorted[i], ideal[i], epsilon = 1e-15);
        }
    }

    #[test]
    fn test_distort_matches_assignment_matrix() {
        let model = ReadoutErrorModel::from_rates(vec![
            QubitReadoutError {
                p0_to_1: 0.05,
                p1_to_0: 0.1,
            },
            QubitReadoutError::symmetric(0.02),
            QubitReadoutError {
                p0_to_1: 0.2,
                p1_to_0: 0.07,
            },
        ]);
        let ideal = arr1(&[100.0, 0.0, 50.0, 25.0, 0.0, 0.0, 0.0, 825.0]);

        let fast = model.distort(ideal.view());
        let dense = model.assignment_matrix().dot(&ideal);
        for i in 0..8 {
            assert_abs_diff_eq!(fast[i], dense[i], epsilon = 1e-10);
        }
        // the channel is trace-preserving
        assert_abs_diff_eq!(fast.sum(), 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_complete_calibration_counts_fit() {
        let model = ReadoutErrorModel::uniform(2, QubitReadoutError::default());
        let (labels, counts_by_label) = model.complete_calibration_counts(10_000.0);
        assert_eq!(labels.len(), 4);
        for label in &labels {
            assert_abs_diff_eq!(
                counts::total_counts(&counts_by_label[label]),
                10_000.0,
                epsilon = 1e-6
            );
        }

        let cal = CompleteCalibration::from_counts(&labels, &counts_by_label).unwrap();
        let expected = model.assignment_matrix();
        for i in 0..4 {
            for j in 0..4 {
                assert_abs_diff_eq!(cal.matrix()[[i, j]], expected[[i, j]], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_tensored_calibration_counts_recover_rates() {
        let model = ReadoutErrorModel::from_rates(vec![
            QubitReadoutError {
                p0_to_1: 0.1,
                p1_to_0: 0.2,
            },
            QubitReadoutError {
                p0_to_1: 0.03,
                p1_to_0: 0.04,
            },
            QubitReadoutError::symmetric(0.05),
        ]);
        let (labels, counts_by_label) = model.tensored_calibration_counts(10_000.0);
        assert_eq!(labels, vec!["000".to_string(), "111".to_string()]);

        let cal =
            TensoredCalibration::from_counts(&model.qubit_pattern(), &labels, &counts_by_label)
                .unwrap();
        for (q, group) in cal.groups().iter().enumerate() {
            let expected = model.single_qubit_matrix(q);
            for i in 0..2 {
                for j in 0..2 {
                    assert_abs_diff_eq!(
                        group.matrix()[[i, j]],
                        expected[[i, j]],
                        epsilon = 1e-10
                    );
                }
            }
        }
    }

    #[test]
    fn test_sampler_seeded_and_conserving() {
        let probabilities = arr1(&[0.5, 0.25, 0.125, 0.125]);
        let a = ShotSampler::new(Some(42)).sample(probabilities.view(), 500, 2);
        let b = ShotSampler::new(Some(42)).sample(probabilities.view(), 500, 2);
        assert_eq!(a, b);
        assert_abs_diff_eq!(counts::total_counts(&a), 500.0, epsilon = 1e-12);
    }

    #[test]
    fn test_model_sample_total() {
        let model = ReadoutErrorModel::uniform(2, QubitReadoutError::symmetric(0.1));
        let ideal = arr1(&[0.0, 0.0, 0.0, 1.0]);
        let sampled = model.sample(ideal.view(), 1000, Some(7));
        assert_abs_diff_eq!(counts::total_counts(&sampled), 1000.0, epsilon = 1e-12);
        for label in sampled.keys() {
            assert_eq!(label.len(), 2);
        }
    }
}
