use log::warn;
use nalgebra::SMatrix;

/* -----------------------------------------------------------------------------
 * Type aliases
 * ----------------------------------------------------------------------------- */
// 1x4, (cx, cy, aspect, height)
pub type DetectBox = SMatrix<f32, 1, 4>;
// 1x8, DetectBox followed by its velocities
pub type StateMean = SMatrix<f32, 1, 8>;
// 8x8
pub type StateCov = SMatrix<f32, 8, 8>;
// 1x4
pub type StateHMean = SMatrix<f32, 1, 4>;
// 4x4
pub type StateHCov = SMatrix<f32, 4, 4>;

const NDIM: usize = 4;
const STD_WEIGHT_POSITION: f32 = 1.0 / 20.0;
const STD_WEIGHT_VELOCITY: f32 = 1.0 / 160.0;

/* -----------------------------------------------------------------------------
 * Kalman state
 * ----------------------------------------------------------------------------- */
#[derive(Debug, Clone, PartialEq)]
pub struct KalmanState {
    pub mean: StateMean,
    pub covariance: StateCov,
}

impl KalmanState {
    pub fn zeros() -> Self {
        Self {
            mean: StateMean::zeros(),
            covariance: StateCov::zeros(),
        }
    }

    /// The (cx, cy, aspect, height) part of the mean.
    pub fn xyah(&self) -> DetectBox {
        DetectBox::new(self.mean[0], self.mean[1], self.mean[2], self.mean[3])
    }

    /// Area of the box described by the mean.
    pub fn area(&self) -> f32 {
        let height = self.mean[3];
        height * (height * self.mean[2])
    }
}

/* -----------------------------------------------------------------------------
 * Kalman Filter
 * ----------------------------------------------------------------------------- */
/// Constant velocity filter over (cx, cy, aspect, height). The matrices are
/// built once and shared by every track of a tracker.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    std_weight_position: f32,
    std_weight_velocity: f32,
    motion_mat: SMatrix<f32, 8, 8>, // 8x8
    update_mat: SMatrix<f32, 4, 8>, // 4x8
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new(STD_WEIGHT_POSITION, STD_WEIGHT_VELOCITY)
    }
}

impl KalmanFilter {
    pub fn new(std_weight_position: f32, std_weight_velocity: f32) -> Self {
        let dt = 1.0;

        let mut motion_mat = SMatrix::<f32, 8, 8>::identity();
        for i in 0..NDIM {
            motion_mat[(i, i + NDIM)] = dt;
        }
        let update_mat = SMatrix::<f32, 4, 8>::identity();

        Self {
            std_weight_position,
            std_weight_velocity,
            motion_mat,
            update_mat,
        }
    }

    pub fn initiate(&self, measurement: &DetectBox) -> KalmanState {
        let mut mean = StateMean::zeros();
        mean.as_mut_slice()[0..NDIM].copy_from_slice(measurement.as_slice());

        // the box may be cropped at the image edge, so take the larger side
        let e = measurement[3].max(measurement[2] * measurement[3]);
        let std = StateMean::from_row_slice(&[
            2.0 * self.std_weight_position * e,
            2.0 * self.std_weight_position * e,
            1e-2,
            2.0 * self.std_weight_position * e,
            10.0 * self.std_weight_velocity * e,
            10.0 * self.std_weight_velocity * e,
            1e-5,
            10.0 * self.std_weight_velocity * e,
        ]);

        let var = std.component_mul(&std);
        KalmanState {
            mean,
            covariance: StateCov::from_diagonal(&var.transpose()),
        }
    }

    pub fn predict(&self, state: &KalmanState) -> KalmanState {
        let height = state.mean[3];
        let std = StateMean::from_row_slice(&[
            self.std_weight_position * height,
            self.std_weight_position * height,
            1e-2,
            self.std_weight_position * height,
            self.std_weight_velocity * height,
            self.std_weight_velocity * height,
            1e-5,
            self.std_weight_velocity * height,
        ]);
        let motion_cov =
            StateCov::from_diagonal(&std.component_mul(&std).transpose());

        let mean = (self.motion_mat * state.mean.transpose()).transpose();
        let covariance = self.motion_mat
            * state.covariance
            * self.motion_mat.transpose()
            + motion_cov;
        KalmanState { mean, covariance }
    }

    /// Corrects `state` with `measurement`. The gain comes from a Cholesky
    /// solve of the innovation covariance; if that matrix is not positive
    /// definite the state is returned unchanged.
    pub fn update(
        &self,
        state: &KalmanState,
        measurement: &DetectBox,
    ) -> KalmanState {
        let (projected_mean, projected_cov) = self.project(state);

        let Some(cholesky) = projected_cov.cholesky() else {
            warn!(
                "innovation covariance is not positive definite, skipping update: {:?}",
                projected_cov
            );
            return state.clone();
        };

        // kalman_gain: 4x8
        let b = (state.covariance * self.update_mat.transpose()).transpose();
        let kalman_gain = cholesky.solve(&b);
        // innovation: 1x4
        let innovation = measurement - projected_mean;

        let mean = state.mean + innovation * kalman_gain;
        let covariance = state.covariance
            - kalman_gain.transpose() * projected_cov * kalman_gain;
        KalmanState { mean, covariance }
    }

    pub fn project(&self, state: &KalmanState) -> (StateHMean, StateHCov) {
        let height = state.mean[3];
        let std = StateHMean::from_row_slice(&[
            self.std_weight_position * height,
            self.std_weight_position * height,
            1e-1,
            self.std_weight_position * height,
        ]);
        let innovation_cov =
            StateHCov::from_diagonal(&std.component_mul(&std).transpose());

        let projected_mean = state.mean * self.update_mat.transpose();
        let projected_cov = self.update_mat
            * state.covariance
            * self.update_mat.transpose()
            + innovation_cov;
        (projected_mean, projected_cov)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearly_eq::assert_nearly_eq;

    fn assert_cov_eq(actual: &StateCov, expected: &StateCov) {
        for (&v, &e) in actual.iter().zip(expected.iter()) {
            assert_nearly_eq!(v, e, 1e-4);
        }
    }

    #[test]
    fn test_initiate() {
        let kalman_filter = KalmanFilter::default();
        // aspect 0.5 -> the height is the larger side
        let measurement = DetectBox::new(1.0, 2.0, 0.5, 4.0);
        let state = kalman_filter.initiate(&measurement);

        assert_eq!(
            state.mean,
            StateMean::from_row_slice(&[1.0, 2.0, 0.5, 4.0, 0.0, 0.0, 0.0, 0.0])
        );
        let expected = StateCov::from_diagonal(
            &StateMean::from_row_slice(&[
                0.16, 0.16, 1.0e-4, 0.16, 6.25e-2, 6.25e-2, 1e-10, 6.25e-2,
            ])
            .transpose(),
        );
        assert_cov_eq(&state.covariance, &expected);
    }

    #[test]
    fn test_initiate_uses_width_when_wider() {
        let kalman_filter = KalmanFilter::default();
        // aspect 3, height 4 -> width 12 drives the scale
        let measurement = DetectBox::new(1.0, 2.0, 3.0, 4.0);
        let state = kalman_filter.initiate(&measurement);

        assert_nearly_eq!(state.covariance[(0, 0)], 1.44, 1e-4);
        assert_nearly_eq!(state.covariance[(3, 3)], 1.44, 1e-4);
        assert_nearly_eq!(state.covariance[(4, 4)], 0.5625, 1e-4);
        assert_nearly_eq!(state.covariance[(2, 2)], 1.0e-4, 1e-6);
    }

    #[test]
    fn test_predict() {
        let kalman_filter = KalmanFilter::default();
        let state = KalmanState {
            mean: StateMean::from_row_slice(&[
                1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0,
            ]),
            covariance: StateCov::from_diagonal(
                &StateMean::from_row_slice(&[
                    0.2, 0.2, 0.01, 0.2, 4.0, 4.0, 0.000001, 4.0,
                ])
                .transpose(),
            ),
        };

        let predicted = kalman_filter.predict(&state);

        assert_eq!(
            predicted.mean,
            StateMean::from_row_slice(&[
                6.0, 8.0, 10.0, 12.0, 5.0, 6.0, 7.0, 8.0
            ])
        );
        #[rustfmt::skip]
        let expected = StateCov::from_row_slice(&[
            4.24, 0.0,  0.0,     0.0,  4.0,      0.0,      0.0,    0.0,
            0.0,  4.24, 0.0,     0.0,  0.0,      4.0,      0.0,    0.0,
            0.0,  0.0,  1.01e-2, 0.0,  0.0,      0.0,      1.0e-6, 0.0,
            0.0,  0.0,  0.0,     4.24, 0.0,      0.0,      0.0,    4.0,
            4.0,  0.0,  0.0,     0.0,  4.000625, 0.0,      0.0,    0.0,
            0.0,  4.0,  0.0,     0.0,  0.0,      4.000625, 0.0,    0.0,
            0.0,  0.0,  1.0e-6,  0.0,  0.0,      0.0,      1.0e-6, 0.0,
            0.0,  0.0,  0.0,     4.0,  0.0,      0.0,      0.0,    4.000625,
        ]);
        assert_cov_eq(&predicted.covariance, &expected);
    }

    #[test]
    fn test_project() {
        let kalman_filter = KalmanFilter::default();
        #[rustfmt::skip]
        let state = KalmanState {
            mean: StateMean::from_row_slice(&[
                1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0,
            ]),
            covariance: StateCov::from_row_slice(&[
                4.24, 0.0,  0.0,     0.0,  4.0,      0.0,      0.0,    0.0,
                0.0,  4.24, 0.0,     0.0,  0.0,      4.0,      0.0,    0.0,
                0.0,  0.0,  1.01e-2, 0.0,  0.0,      0.0,      1.0e-6, 0.0,
                0.0,  0.0,  0.0,     4.24, 0.0,      0.0,      0.0,    4.0,
                4.0,  0.0,  0.0,     0.0,  4.000625, 0.0,      0.0,    0.0,
                0.0,  4.0,  0.0,     0.0,  0.0,      4.000625, 0.0,    0.0,
                0.0,  0.0,  1.0e-6,  0.0,  0.0,      0.0,      1.0e-6, 0.0,
                0.0,  0.0,  0.0,     4.0,  0.0,      0.0,      0.0,    4.000625,
            ]),
        };

        let (projected_mean, projected_cov) = kalman_filter.project(&state);

        assert_eq!(projected_mean, StateHMean::new(1.0, 2.0, 3.0, 4.0));
        let expected = StateHCov::from_diagonal(
            &StateHMean::new(4.28, 4.28, 0.0201, 4.28).transpose(),
        );
        for (&v, &e) in projected_cov.iter().zip(expected.iter()) {
            assert_nearly_eq!(v, e, 1e-4);
        }
    }

    #[test]
    fn test_update_with_projected_measurement_keeps_mean() {
        let kalman_filter = KalmanFilter::default();
        #[rustfmt::skip]
        let state = KalmanState {
            mean: StateMean::from_row_slice(&[
                1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0,
            ]),
            covariance: StateCov::from_row_slice(&[
                4.24, 0.0,  0.0,     0.0,  4.0,      0.0,      0.0,    0.0,
                0.0,  4.24, 0.0,     0.0,  0.0,      4.0,      0.0,    0.0,
                0.0,  0.0,  1.01e-2, 0.0,  0.0,      0.0,      1.0e-6, 0.0,
                0.0,  0.0,  0.0,     4.24, 0.0,      0.0,      0.0,    4.0,
                4.0,  0.0,  0.0,     0.0,  4.000625, 0.0,      0.0,    0.0,
                0.0,  4.0,  0.0,     0.0,  0.0,      4.000625, 0.0,    0.0,
                0.0,  0.0,  1.0e-6,  0.0,  0.0,      0.0,      1.0e-6, 0.0,
                0.0,  0.0,  0.0,     4.0,  0.0,      0.0,      0.0,    4.000625,
            ]),
        };

        let measurement = DetectBox::new(1.0, 2.0, 3.0, 4.0);
        let updated = kalman_filter.update(&state, &measurement);

        for (&v, &e) in updated.mean.iter().zip(state.mean.iter()) {
            assert_nearly_eq!(v, e, 1e-5);
        }
        #[rustfmt::skip]
        let expected = StateCov::from_row_slice(&[
            3.96261682e-02, 0.0, 0.0, 0.0, 3.73831776e-02, 0.0, 0.0, 0.0,
            0.0, 3.96261682e-02, 0.0, 0.0, 0.0, 3.73831776e-02, 0.0, 0.0,
            0.0, 0.0, 5.02487562e-03, 0.0, 0.0, 0.0, 4.97512438e-07, 0.0,
            0.0, 0.0, 0.0, 3.96261682e-02, 0.0, 0.0, 0.0, 3.73831776e-02,
            3.73831776e-02, 0.0, 0.0, 0.0, 2.62307243e-01, 0.0, 0.0, 0.0,
            0.0, 3.73831776e-02, 0.0, 0.0, 0.0, 2.62307243e-01, 0.0, 0.0,
            0.0, 0.0, 4.97512438e-07, 0.0, 0.0, 0.0, 9.99950249e-07, 0.0,
            0.0, 0.0, 0.0, 3.73831776e-02, 0.0, 0.0, 0.0, 2.62307243e-01,
        ]);
        assert_cov_eq(&updated.covariance, &expected);
    }

    #[test]
    fn test_update_moves_mean_towards_measurement() {
        let kalman_filter = KalmanFilter::default();
        let initial = DetectBox::new(100.0, 100.0, 0.5, 40.0);
        let predicted =
            kalman_filter.predict(&kalman_filter.initiate(&initial));

        let observed = DetectBox::new(106.0, 97.0, 0.5, 42.0);
        let updated = kalman_filter.update(&predicted, &observed);

        let before = (predicted.xyah() - observed).norm();
        let after = (updated.xyah() - observed).norm();
        assert!(
            after < before,
            "distance did not shrink: before {}, after {}",
            before,
            after
        );
        // and the correction does not overshoot
        assert!(updated.mean[0] > 100.0 && updated.mean[0] < 106.0);
        assert!(updated.mean[1] < 100.0 && updated.mean[1] > 97.0);
    }

    #[test]
    fn test_update_shrinks_position_variance() {
        let kalman_filter = KalmanFilter::default();
        let measurement = DetectBox::new(50.0, 60.0, 1.0, 30.0);
        let predicted =
            kalman_filter.predict(&kalman_filter.initiate(&measurement));
        let updated = kalman_filter.update(&predicted, &measurement);
        for i in 0..4 {
            assert!(updated.covariance[(i, i)] < predicted.covariance[(i, i)]);
        }
    }

    #[test]
    fn test_repeated_cycles_keep_static_mean() {
        let kalman_filter = KalmanFilter::default();
        let measurement = DetectBox::new(1.0, 2.0, 3.0, 4.0);
        let mut state = kalman_filter.initiate(&measurement);

        for _ in 0..10 {
            state = kalman_filter.update(&state, &measurement);
            state = kalman_filter.predict(&state);
        }
        state = kalman_filter.predict(&state);

        let expected = StateMean::from_row_slice(&[
            1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0,
        ]);
        for (&v, &e) in state.mean.iter().zip(expected.iter()) {
            assert_nearly_eq!(v, e, 1e-4);
        }
    }

    #[test]
    fn test_update_with_degenerate_covariance_is_a_no_op() {
        let kalman_filter = KalmanFilter::default();
        let mut state = KalmanState::zeros();
        // height 0 gives zero observation noise on three axes
        state.covariance = StateCov::from_diagonal_element(-1.0);
        let updated =
            kalman_filter.update(&state, &DetectBox::new(1.0, 1.0, 1.0, 1.0));
        assert_eq!(updated, state);
    }
}
