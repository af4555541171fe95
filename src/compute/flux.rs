//! Physical flux of the five-field compressible fluid system.
//!
//! Closure is an ideal gas: `p = (gamma - 1) * (en - |m|^2 / (2 rh))`.

use crate::schema::FlowState;

use super::state::{NFIELDS, field};

/// Convert a primitive flow state to a conserved-variable cell vector.
pub fn conserved(state: &FlowState, gamma: f64) -> [f64; NFIELDS] {
    let rh = state.density;
    let (vx, vy, vz) = state.velocity;
    let kinetic = 0.5 * rh * (vx * vx + vy * vy + vz * vz);
    let internal = state.pressure / (gamma - 1.0);
    [rh, rh * vx, rh * vy, rh * vz, internal + kinetic]
}

/// Gas pressure of a conserved cell vector.
#[inline]
pub fn pressure(u: &[f64], gamma: f64) -> f64 {
    let rh = u[field::RH];
    let kinetic =
        0.5 * (u[field::MX].powi(2) + u[field::MY].powi(2) + u[field::MZ].powi(2)) / rh;
    (gamma - 1.0) * (u[field::EN] - kinetic)
}

/// Adiabatic sound speed of a conserved cell vector.
#[inline]
pub fn sound_speed(u: &[f64], gamma: f64) -> f64 {
    (gamma * pressure(u, gamma) / u[field::RH]).sqrt()
}

/// Fastest signal speed along `axis`: `|v_axis| + c`.
#[inline]
pub fn signal_speed(u: &[f64], axis: usize, gamma: f64) -> f64 {
    let v = u[field::MX + axis] / u[field::RH];
    v.abs() + sound_speed(u, gamma)
}

/// Physical flux vector along `axis` (0 = x, 1 = y, 2 = z).
pub fn physical_flux(u: &[f64], axis: usize, gamma: f64) -> [f64; NFIELDS] {
    let rh = u[field::RH];
    let p = pressure(u, gamma);
    let v = u[field::MX + axis] / rh;

    let mut f = [
        u[field::MX + axis],
        u[field::MX] * v,
        u[field::MY] * v,
        u[field::MZ] * v,
        (u[field::EN] + p) * v,
    ];
    f[field::MX + axis] += p;
    f
}

/// Rusanov (local Lax-Friedrichs) numerical flux at the interface between
/// cells `ul` and `ur` along `axis`.
pub fn rusanov_flux(ul: &[f64], ur: &[f64], axis: usize, gamma: f64) -> [f64; NFIELDS] {
    let fl = physical_flux(ul, axis, gamma);
    let fr = physical_flux(ur, axis, gamma);
    let smax = signal_speed(ul, axis, gamma).max(signal_speed(ur, axis, gamma));

    let mut f = [0.0; NFIELDS];
    for n in 0..NFIELDS {
        f[n] = 0.5 * (fl[n] + fr[n]) - 0.5 * smax * (ur[n] - ul[n]);
    }
    f
}
