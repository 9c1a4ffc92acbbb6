//! Sky coordinate conversions needed by the index builder

/// Conversion from equatorial (ICRS) to galactic coordinates, in degrees
pub trait SkyTransform: Send + Sync {
    /// Galactic longitude and latitude for the given right ascension and declination
    fn icrs_to_galactic(&self, ra: f64, dec: f64) -> (f64, f64);
}

/// Rotation-matrix conversion using the IAU galactic pole definition
#[derive(Debug, Clone, Copy, Default)]
pub struct GalacticTransform;

// ICRS to galactic rotation matrix
const ROTATION: [[f64; 3]; 3] = [
    [-0.054_875_560_416_215_4, -0.873_437_090_234_885, -0.483_835_015_548_713_2],
    [0.494_109_427_875_583_7, -0.444_829_629_960_011_2, 0.746_982_244_497_218_9],
    [-0.867_666_149_019_004_7, -0.198_076_373_431_201_5, 0.455_983_776_175_066_9],
];

impl SkyTransform for GalacticTransform {
    fn icrs_to_galactic(&self, ra: f64, dec: f64) -> (f64, f64) {
        let (ra, dec) = (ra.to_radians(), dec.to_radians());
        let v = [dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin()];

        let mut g = [0.0; 3];
        for (out, row) in g.iter_mut().zip(ROTATION.iter()) {
            *out = row.iter().zip(v.iter()).map(|(a, b)| a * b).sum();
        }

        let l = g[1].atan2(g[0]).to_degrees().rem_euclid(360.0);
        let b = g[2].clamp(-1.0, 1.0).asin().to_degrees();
        (l, b)
    }
}
