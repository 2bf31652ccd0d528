// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the closure-constraint solver of the 3-RPS wrist mechanism.
//!
//! The mechanism state is the 12-vector
//! `qp = [θ1 θ2 θ3 | d1 d2 d3 | α β γ | z x y]`: the three revolute pivot
//! angles, the three prismatic leg lengths, the platform Euler angles
//! (x-y-z order) and the platform position. Nine closure constraints
//! `φ(qp) = 0` tie the legs to the platform, leaving three degrees of
//! freedom. Either the prismatic lengths (parallel space) or the wrist
//! coordinates `[α β z]` (serial space) can be selected as the driving
//! coordinates; the solver finds the remaining nine by Newton iteration.
use crate::exception::MeiiException;
use crate::exo::config::RpsGeometry;
use crate::utils::{Matrix12, Matrix12x3, Matrix3, Matrix9x12, Vector12, Vector3, Vector9};
use crate::MeiiResult;

/// Indices of the prismatic leg lengths within `qp`.
pub const SELECT_Q_PAR: [usize; 3] = [3, 4, 5];
/// Indices of the wrist coordinates `[α β z]` within `qp`.
pub const SELECT_Q_SER: [usize; 3] = [6, 7, 9];

const MAX_IT: u32 = 10;
const TOL: f64 = 1e-12;

/// Result of one position solve.
#[derive(Debug, Clone)]
pub struct RpsSolution {
    /// Coordinates of the complementary space: serial `[α β z]` after a
    /// forward solve, parallel `[d1 d2 d3]` after an inverse solve.
    pub qs_out: Vector3,
    /// The full converged mechanism state.
    pub qp: Vector12,
    /// Sensitivity of the full state to the driving coordinates, dqp/dqs.
    pub rho: Matrix12x3,
    /// Jacobian of the output coordinates with respect to the driving
    /// coordinates, the rows of `rho` picked out by the output selection.
    pub jacobian: Matrix3,
}

impl RpsSolution {
    /// Maps a driving-space velocity to the output space.
    pub fn output_velocity(&self, qs_dot: &Vector3) -> Vector3 {
        self.jacobian * qs_dot
    }
    /// Maps a driving-space velocity to the full mechanism state.
    pub fn qp_velocity(&self, qs_dot: &Vector3) -> Vector12 {
        self.rho * qs_dot
    }
}

/// Newton solver for the closure constraints, warm-started from the previous
/// converged state.
///
/// One instance is owned per exoskeleton object and passed by reference each
/// cycle; there is no hidden shared state. After a failed solve the last
/// iterate stays in the context as the next warm start but must not be used
/// for commanding torques.
#[derive(Debug, Clone)]
pub struct RpsKinematics {
    geometry: RpsGeometry,
    qp: Vector12,
}

impl RpsKinematics {
    /// Creates a solver warm-started at the passive rest configuration of the
    /// mechanism.
    pub fn new(geometry: RpsGeometry) -> Self {
        let rest_leg_length = 0.0952;
        let qp = symmetric_guess(&geometry, rest_leg_length);
        RpsKinematics { geometry, qp }
    }

    /// The last converged (or attempted) mechanism state.
    pub fn qp(&self) -> &Vector12 {
        &self.qp
    }

    /// Solves the closure constraints for the given driving coordinates.
    ///
    /// `select_q` picks the driving coordinates within `qp` and must be
    /// [`SELECT_Q_PAR`] or [`SELECT_Q_SER`].
    ///
    /// # Errors
    /// * KinematicsException if the iteration budget is exhausted or the
    /// constraint Jacobian becomes singular.
    pub fn solve_rps_kinematics(
        &mut self,
        select_q: [usize; 3],
        qs: &Vector3,
    ) -> MeiiResult<Vector12> {
        let mut qp = self.qp;
        for iteration in 0..MAX_IT {
            let psi = psi_update(&self.geometry, select_q, qs, &qp);
            let residual = psi.norm();
            if residual < TOL {
                self.qp = qp;
                return Ok(qp);
            }
            let psi_d_qp = psi_d_qp_update(&self.geometry, select_q, &qp);
            let step = match psi_d_qp.lu().solve(&psi) {
                Some(step) => step,
                None => {
                    self.qp = qp;
                    return Err(MeiiException::KinematicsException {
                        iterations: iteration,
                        residual,
                    });
                }
            };
            qp -= step;
        }
        let residual = psi_update(&self.geometry, select_q, qs, &qp).norm();
        self.qp = qp;
        if residual < TOL {
            return Ok(qp);
        }
        Err(MeiiException::KinematicsException {
            iterations: MAX_IT,
            residual,
        })
    }

    /// Parallel (prismatic) positions to wrist coordinates.
    pub fn forward(&mut self, q_par: &Vector3) -> MeiiResult<RpsSolution> {
        self.solve_and_extract(SELECT_Q_PAR, q_par)
    }

    /// Wrist coordinates to parallel (prismatic) positions.
    pub fn inverse(&mut self, q_ser: &Vector3) -> MeiiResult<RpsSolution> {
        self.solve_and_extract(SELECT_Q_SER, q_ser)
    }

    /// Parallel velocities to wrist velocities, with the full state rate.
    ///
    /// `solution` must come from a [`forward`](`RpsKinematics::forward`) solve
    /// at the current position; no position solve is run here.
    pub fn forward_velocity(
        &self,
        solution: &RpsSolution,
        q_par_dot: &Vector3,
    ) -> (Vector3, Vector12) {
        (
            solution.output_velocity(q_par_dot),
            solution.qp_velocity(q_par_dot),
        )
    }

    /// Wrist velocities to parallel velocities, with the full state rate.
    ///
    /// `solution` must come from an [`inverse`](`RpsKinematics::inverse`)
    /// solve at the current position; no position solve is run here.
    pub fn inverse_velocity(
        &self,
        solution: &RpsSolution,
        q_ser_dot: &Vector3,
    ) -> (Vector3, Vector12) {
        (
            solution.output_velocity(q_ser_dot),
            solution.qp_velocity(q_ser_dot),
        )
    }

    /// Static-equilibrium torque mapping by the transpose-Jacobian duality.
    ///
    /// `select_q` names the coordinates carrying the applied torques `tau_b`;
    /// returned are the torques required at the complementary coordinates and
    /// the applied torques embedded in the full 12-vector of generalized
    /// forces.
    pub fn solve_static_rps_torques(
        &self,
        select_q: [usize; 3],
        tau_b: &Vector3,
        qp: &Vector12,
    ) -> MeiiResult<(Vector3, Vector12)> {
        let driving = select_q_invert(select_q);
        let rho = generate_rho(&self.geometry, driving, qp)?;
        let mut tau_p = Vector12::zeros();
        for (i, &index) in select_q.iter().enumerate() {
            tau_p[index] = tau_b[i];
        }
        let tau_s = rho.transpose() * tau_p;
        Ok((tau_s, tau_p))
    }

    fn solve_and_extract(
        &mut self,
        select_q: [usize; 3],
        qs: &Vector3,
    ) -> MeiiResult<RpsSolution> {
        let qp = self.solve_rps_kinematics(select_q, qs)?;
        let rho = generate_rho(&self.geometry, select_q, &qp)?;
        let out_select = select_q_invert(select_q);
        let mut jacobian = Matrix3::zeros();
        let mut qs_out = Vector3::zeros();
        for (row, &index) in out_select.iter().enumerate() {
            qs_out[row] = qp[index];
            for column in 0..3 {
                jacobian[(row, column)] = rho[(index, column)];
            }
        }
        Ok(RpsSolution {
            qs_out,
            qp,
            rho,
            jacobian,
        })
    }
}

/// Maps a driving-coordinate selection to the complementary output selection.
pub(crate) fn select_q_invert(select_q: [usize; 3]) -> [usize; 3] {
    if select_q == SELECT_Q_PAR {
        SELECT_Q_SER
    } else {
        SELECT_Q_PAR
    }
}

/// Sensitivity of the full state to the driving coordinates at a converged
/// state: solves `ψ_d_qp · ρ = [0; I₃]`.
fn generate_rho(
    geometry: &RpsGeometry,
    select_q: [usize; 3],
    qp: &Vector12,
) -> MeiiResult<Matrix12x3> {
    let psi_d_qp = psi_d_qp_update(geometry, select_q, qp);
    let mut rhs = Matrix12x3::zeros();
    for i in 0..3 {
        rhs[(9 + i, i)] = 1.;
    }
    psi_d_qp
        .lu()
        .solve(&rhs)
        .ok_or(MeiiException::KinematicsException {
            iterations: 0,
            residual: f64::INFINITY,
        })
}

/// The nine closure constraints: for each leg the sphere-joint point reached
/// along the leg must coincide with the platform attachment point.
fn phi_update(geometry: &RpsGeometry, qp: &Vector12) -> Vector9 {
    let rotation = platform_rotation(qp[6], qp[7], qp[8]);
    let position = Vector3::new(qp[10], qp[11], qp[9]);
    let mut phi = Vector9::zeros();
    for leg in 0..3 {
        let (cos_psi, sin_psi) = leg_azimuth(leg);
        let theta = qp[leg];
        let length = qp[3 + leg];
        let base = geometry.base_radius * Vector3::new(cos_psi, sin_psi, 0.);
        let direction = Vector3::new(
            -theta.sin() * cos_psi,
            -theta.sin() * sin_psi,
            theta.cos(),
        );
        let attachment =
            geometry.platform_radius * Vector3::new(cos_psi, sin_psi, 0.);
        let residual = base + length * direction - position - rotation * attachment;
        for axis in 0..3 {
            phi[3 * leg + axis] = residual[axis];
        }
    }
    phi
}

/// Analytic Jacobian of [`phi_update`] with respect to `qp`.
fn phi_d_qp_update(geometry: &RpsGeometry, qp: &Vector12) -> Matrix9x12 {
    let (d_alpha, d_beta, d_gamma) = platform_rotation_derivatives(qp[6], qp[7], qp[8]);
    let mut phi_d_qp = Matrix9x12::zeros();
    for leg in 0..3 {
        let (cos_psi, sin_psi) = leg_azimuth(leg);
        let theta = qp[leg];
        let length = qp[3 + leg];
        let direction = Vector3::new(
            -theta.sin() * cos_psi,
            -theta.sin() * sin_psi,
            theta.cos(),
        );
        let direction_d_theta = Vector3::new(
            -theta.cos() * cos_psi,
            -theta.cos() * sin_psi,
            -theta.sin(),
        );
        let attachment =
            geometry.platform_radius * Vector3::new(cos_psi, sin_psi, 0.);
        let euler_columns = [
            -d_alpha * attachment,
            -d_beta * attachment,
            -d_gamma * attachment,
        ];
        for axis in 0..3 {
            let row = 3 * leg + axis;
            phi_d_qp[(row, leg)] = length * direction_d_theta[axis];
            phi_d_qp[(row, 3 + leg)] = direction[axis];
            for euler in 0..3 {
                phi_d_qp[(row, 6 + euler)] = euler_columns[euler][axis];
            }
        }
        // position columns: z, x, y
        phi_d_qp[(3 * leg + 2, 9)] = -1.;
        phi_d_qp[(3 * leg, 10)] = -1.;
        phi_d_qp[(3 * leg + 1, 11)] = -1.;
    }
    phi_d_qp
}

/// Stacks the closure constraints with the driving-coordinate equations
/// `qp[select] − qs = 0`.
fn psi_update(
    geometry: &RpsGeometry,
    select_q: [usize; 3],
    qs: &Vector3,
    qp: &Vector12,
) -> Vector12 {
    let phi = phi_update(geometry, qp);
    let mut psi = Vector12::zeros();
    for row in 0..9 {
        psi[row] = phi[row];
    }
    for (i, &index) in select_q.iter().enumerate() {
        psi[9 + i] = qp[index] - qs[i];
    }
    psi
}

/// Jacobian of [`psi_update`] with respect to `qp`.
fn psi_d_qp_update(geometry: &RpsGeometry, select_q: [usize; 3], qp: &Vector12) -> Matrix12 {
    let phi_d_qp = phi_d_qp_update(geometry, qp);
    let mut psi_d_qp = Matrix12::zeros();
    for row in 0..9 {
        for column in 0..12 {
            psi_d_qp[(row, column)] = phi_d_qp[(row, column)];
        }
    }
    for (i, &index) in select_q.iter().enumerate() {
        psi_d_qp[(9 + i, index)] = 1.;
    }
    psi_d_qp
}

/// Platform orientation `Rx(α)·Ry(β)·Rz(γ)`.
fn platform_rotation(alpha: f64, beta: f64, gamma: f64) -> Matrix3 {
    rot_x(alpha) * rot_y(beta) * rot_z(gamma)
}

fn platform_rotation_derivatives(
    alpha: f64,
    beta: f64,
    gamma: f64,
) -> (Matrix3, Matrix3, Matrix3) {
    (
        rot_x_d(alpha) * rot_y(beta) * rot_z(gamma),
        rot_x(alpha) * rot_y_d(beta) * rot_z(gamma),
        rot_x(alpha) * rot_y(beta) * rot_z_d(gamma),
    )
}

fn rot_x(angle: f64) -> Matrix3 {
    let (s, c) = angle.sin_cos();
    Matrix3::new(1., 0., 0., 0., c, -s, 0., s, c)
}
fn rot_y(angle: f64) -> Matrix3 {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, 0., s, 0., 1., 0., -s, 0., c)
}
fn rot_z(angle: f64) -> Matrix3 {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, -s, 0., s, c, 0., 0., 0., 1.)
}
fn rot_x_d(angle: f64) -> Matrix3 {
    let (s, c) = angle.sin_cos();
    Matrix3::new(0., 0., 0., 0., -s, -c, 0., c, -s)
}
fn rot_y_d(angle: f64) -> Matrix3 {
    let (s, c) = angle.sin_cos();
    Matrix3::new(-s, 0., c, 0., 0., 0., -c, 0., -s)
}
fn rot_z_d(angle: f64) -> Matrix3 {
    let (s, c) = angle.sin_cos();
    Matrix3::new(-s, -c, 0., c, -s, 0., 0., 0., 0.)
}

fn leg_azimuth(leg: usize) -> (f64, f64) {
    let psi = 2. * std::f64::consts::PI * leg as f64 / 3.;
    (psi.cos(), psi.sin())
}

/// Closed-form symmetric configuration for equal leg lengths, used as the
/// initial warm start.
fn symmetric_guess(geometry: &RpsGeometry, leg_length: f64) -> Vector12 {
    let offset = geometry.base_radius - geometry.platform_radius;
    let theta = (offset / leg_length).asin();
    let height = leg_length * theta.cos();
    let mut qp = Vector12::zeros();
    for leg in 0..3 {
        qp[leg] = theta;
        qp[3 + leg] = leg_length;
    }
    qp[9] = height;
    qp
}

#[cfg(test)]
mod test {
    use super::*;

    fn solver() -> RpsKinematics {
        RpsKinematics::new(RpsGeometry::default())
    }

    #[test]
    fn symmetric_forward_solution_is_exact() {
        let geometry = RpsGeometry::default();
        let mut kinematics = solver();
        for &d in &[0.09, 0.10, 0.11, 0.12, 0.13] {
            let solution = kinematics.forward(&Vector3::new(d, d, d)).unwrap();
            let offset = geometry.base_radius - geometry.platform_radius;
            let height = (d * d - offset * offset).sqrt();
            assert!((solution.qs_out[0]).abs() < 1e-9, "alpha at d={}", d);
            assert!((solution.qs_out[1]).abs() < 1e-9, "beta at d={}", d);
            assert!((solution.qs_out[2] - height).abs() < 1e-9, "z at d={}", d);
        }
    }

    #[test]
    fn forward_inverse_round_trip() {
        let mut kinematics = solver();
        for &q_par in &[
            Vector3::new(0.10, 0.11, 0.12),
            Vector3::new(0.12, 0.10, 0.11),
            Vector3::new(0.095, 0.095, 0.105),
        ] {
            let forward = kinematics.forward(&q_par).unwrap();
            let inverse = kinematics.inverse(&forward.qs_out).unwrap();
            assert!((inverse.qs_out - q_par).norm() < 1e-9);
        }
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let mut kinematics = solver();
        let q_par = Vector3::new(0.105, 0.115, 0.11);
        let solution = kinematics.forward(&q_par).unwrap();
        // large enough that the solver residual does not dominate the
        // central difference, small enough that truncation stays below 1e-6
        let h = 1e-5;
        for column in 0..3 {
            let mut plus = q_par;
            let mut minus = q_par;
            plus[column] += h;
            minus[column] -= h;
            let qs_plus = kinematics.forward(&plus).unwrap().qs_out;
            let qs_minus = kinematics.forward(&minus).unwrap().qs_out;
            let numeric = (qs_plus - qs_minus) / (2. * h);
            for row in 0..3 {
                assert!(
                    (solution.jacobian[(row, column)] - numeric[row]).abs() < 1e-6,
                    "jacobian entry ({},{})",
                    row,
                    column
                );
            }
        }
    }

    #[test]
    fn velocity_mapping_round_trip() {
        let mut kinematics = solver();
        let q_par = Vector3::new(0.11, 0.105, 0.12);
        let q_par_dot = Vector3::new(0.01, -0.005, 0.002);
        let forward = kinematics.forward(&q_par).unwrap();
        let (q_ser_dot, _) = kinematics.forward_velocity(&forward, &q_par_dot);
        let inverse = kinematics.inverse(&forward.qs_out).unwrap();
        let (q_par_dot_back, _) = kinematics.inverse_velocity(&inverse, &q_ser_dot);
        assert!((q_par_dot_back - q_par_dot).norm() < 1e-6);
    }

    #[test]
    fn static_torques_follow_the_transpose_jacobian() {
        let mut kinematics = solver();
        let q_par = Vector3::new(0.115, 0.11, 0.105);
        let solution = kinematics.forward(&q_par).unwrap();
        let tau_ser = Vector3::new(1.5, -0.75, 12.0);
        let (tau_par, tau_p) = kinematics
            .solve_static_rps_torques(SELECT_Q_SER, &tau_ser, &solution.qp)
            .unwrap();
        let expected = solution.jacobian.transpose() * tau_ser;
        assert!((tau_par - expected).norm() < 1e-9);
        assert_eq!(tau_p[SELECT_Q_SER[0]], 1.5);
        assert_eq!(tau_p[SELECT_Q_PAR[0]], 0.);
    }

    #[test]
    fn selection_inversion_is_symmetric() {
        assert_eq!(select_q_invert(SELECT_Q_PAR), SELECT_Q_SER);
        assert_eq!(select_q_invert(SELECT_Q_SER), SELECT_Q_PAR);
    }
}
