//! Small angular helpers shared by clustering and pointing checks.

/// Straight-line distance between two axis pairs, treating them as planar.
pub fn planar_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// Great-circle separation in degrees between two `(longitude, latitude)`
/// positions given in degrees (RA/Dec or Az/El).
pub fn angular_separation_deg(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lon1, lat1) = (a.0.to_radians(), a.1.to_radians());
    let (lon2, lat2) = (b.0.to_radians(), b.1.to_radians());
    let half_dlat = (lat2 - lat1) / 2.0;
    let half_dlon = (lon2 - lon1) / 2.0;
    let h = half_dlat.sin().powi(2) + lat1.cos() * lat2.cos() * half_dlon.sin().powi(2);
    (2.0 * h.sqrt().min(1.0).asin()).to_degrees()
}
