#![forbid(unsafe_code)]

/// Proton rest mass in GeV.
pub const PROTON_REST_MASS_GEV: f64 = 0.9382720813;

/// Lorentz factor for a total beam energy. Non-positive and NaN energies read as at rest.
pub fn lorentz_gamma(energy_gev: f64) -> f64 {
    if energy_gev > 0.0 {
        energy_gev / PROTON_REST_MASS_GEV
    } else {
        1.0
    }
}

/// Relativistic beta (v/c) for a total beam energy in GeV, always within [0, 1].
pub fn beta_from_energy(energy_gev: f64) -> f64 {
    let gamma = lorentz_gamma(energy_gev);
    if gamma.is_nan() || gamma <= 1.0 {
        return 0.0;
    }
    (1.0 - 1.0 / (gamma * gamma)).sqrt().clamp(0.0, 1.0)
}
