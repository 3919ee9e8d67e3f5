//! HOA decoding: spherical harmonics, AllRAD decoder design and near-field
//! compensation
//!
//! Decoders are designed by panning each point of a spherical design to the
//! loudspeakers with the point source panner and projecting the results onto
//! the spherical harmonics of the declared order and normalization. The
//! decoder is static over the item's lifetime.

use admr_core::Vec3;
use ndarray::Array2;

use admr_model::blocks::Normalization;
use admr_model::items::HoaTypeMetadata;

use crate::error::{RenderError, RenderResult};
use crate::point_source::PointSourcePanner;
use crate::sphere::ALLRAD_POINTS;

/// Exact factorial as a float.
fn fact(n: i32) -> f64 {
    (1..=n as u64).map(|i| i as f64).product()
}

/// Associated Legendre function P_n^m(x), omitting the Condon-Shortley
/// phase.
fn alegendre(n: i32, m: i32, x: f64) -> f64 {
    debug_assert!(m >= 0 && n >= m);

    // P_m^m by the double-factorial closed form
    let mut pmm = 1.0;
    if m > 0 {
        let somx2 = ((1.0 - x) * (1.0 + x)).sqrt();
        for i in 1..=m {
            pmm *= (2 * i - 1) as f64 * somx2;
        }
    }
    if n == m {
        return pmm;
    }

    let mut pmm1 = x * (2 * m + 1) as f64 * pmm;
    if n == m + 1 {
        return pmm1;
    }

    for ll in (m + 2)..=n {
        let pll = ((2 * ll - 1) as f64 * x * pmm1 - (ll + m - 1) as f64 * pmm)
            / (ll - m) as f64;
        pmm = pmm1;
        pmm1 = pll;
    }
    pmm1
}

/// N3D normalisation for order n and absolute degree m.
fn norm_n3d(n: i32, abs_m: i32) -> f64 {
    ((2 * n + 1) as f64 * fact(n - abs_m) / fact(n + abs_m)).sqrt()
}

/// SN3D normalisation for order n and absolute degree m.
fn norm_sn3d(n: i32, abs_m: i32) -> f64 {
    (fact(n - abs_m) / fact(n + abs_m)).sqrt()
}

/// FuMa normalisation for order n and absolute degree m; defined up to
/// order 3.
fn norm_fuma(n: i32, abs_m: i32) -> RenderResult<f64> {
    let factor = match (n, abs_m) {
        (0, 0) => 1.0 / 2.0_f64.sqrt(),
        (1, 0) | (1, 1) => 1.0,
        (2, 0) => 1.0,
        (2, 1) | (2, 2) => 2.0 / 3.0_f64.sqrt(),
        (3, 0) => 1.0,
        (3, 1) => (45.0 / 32.0_f64).sqrt(),
        (3, 2) => 3.0 / 5.0_f64.sqrt(),
        (3, 3) => (8.0 / 5.0_f64).sqrt(),
        _ => {
            return Err(RenderError::Hoa(format!(
                "the FuMa normalization is only defined up to order 3, not {}",
                n
            )))
        }
    };
    Ok(norm_sn3d(n, abs_m) * factor)
}

fn norm_value(norm: Normalization, n: i32, abs_m: i32) -> RenderResult<f64> {
    match norm {
        Normalization::N3D => Ok(norm_n3d(n, abs_m)),
        Normalization::SN3D => Ok(norm_sn3d(n, abs_m)),
        Normalization::FuMa => norm_fuma(n, abs_m),
    }
}

/// Spherical harmonic Y_n^m at azimuth/elevation in radians.
fn sph_harm(n: i32, m: i32, az: f64, el: f64, norm: Normalization) -> RenderResult<f64> {
    let scale = if m > 0 {
        2.0_f64.sqrt() * (m as f64 * az).cos()
    } else if m < 0 {
        -(2.0_f64.sqrt()) * (m as f64 * az).sin()
    } else {
        1.0
    };

    Ok(norm_value(norm, n, m.abs())? * alegendre(n, m.abs(), el.sin()) * scale)
}

fn point_az_el(point: Vec3) -> (f64, f64) {
    (
        -point.x.atan2(point.y),
        point.z.atan2(point.x.hypot(point.y)),
    )
}

/// Design a decoder matrix using the AllRAD technique.
///
/// `g_virt` holds the point-source gains for each virtual point, shape
/// (speakers, points). Returns a (speakers, channels) matrix.
pub fn allrad_design(
    points: &[Vec3],
    g_virt: &Array2<f64>,
    orders: &[i32],
    degrees: &[i32],
    norm: Normalization,
) -> RenderResult<Array2<f64>> {
    let num_channels = orders.len();
    let num_points = points.len();
    let num_speakers = g_virt.nrows();

    for (&n, &m) in orders.iter().zip(degrees) {
        if n < 0 || m.abs() > n {
            return Err(RenderError::Hoa(format!(
                "invalid order/degree pair ({}, {})",
                n, m
            )));
        }
    }

    // spherical harmonics of the virtual directions, shape (channels,
    // points), in N3D
    let mut y_virt = Array2::<f64>::zeros((num_channels, num_points));
    for (c, (&n, &m)) in orders.iter().zip(degrees).enumerate() {
        for (k, &point) in points.iter().enumerate() {
            let (az, el) = point_az_el(point);
            y_virt[[c, k]] = sph_harm(n, m, az, el, Normalization::N3D)?;
        }
    }

    // basic decode of the virtual array, then panning through to the real
    // speakers
    let mut decoder = Array2::<f64>::zeros((num_speakers, num_channels));
    for l in 0..num_speakers {
        for c in 0..num_channels {
            decoder[[l, c]] = (0..num_points)
                .map(|k| g_virt[[l, k]] * y_virt[[c, k]])
                .sum::<f64>()
                / num_points as f64;
        }
    }

    // compensate for the energy lost to the panning
    let mut resampled_norm_sq = 0.0;
    for l in 0..num_speakers {
        for k in 0..num_points {
            let v: f64 = (0..num_channels).map(|c| decoder[[l, c]] * y_virt[[c, k]]).sum();
            resampled_norm_sq += v * v;
        }
    }
    let compensation = (num_points as f64).sqrt() / resampled_norm_sq.sqrt();
    decoder.mapv_inplace(|v| v * compensation);

    // convert from N3D to the declared input normalization
    for (c, (&n, &m)) in orders.iter().zip(degrees).enumerate() {
        let scale = norm_n3d(n, m.abs()) / norm_value(norm, n, m.abs())?;
        for l in 0..num_speakers {
            decoder[[l, c]] *= scale;
        }
    }

    Ok(decoder)
}

/// Designs HOA decoders for one layout, caching the panning results for the
/// virtual array.
pub struct HoaDecoderDesign {
    g_virt: Array2<f64>,
    num_speakers: usize,
}

impl HoaDecoderDesign {
    pub fn new(panner: &PointSourcePanner) -> RenderResult<Self> {
        let num_speakers = panner.num_channels();
        let mut g_virt = Array2::<f64>::zeros((num_speakers, ALLRAD_POINTS.len()));

        for (k, &point) in ALLRAD_POINTS.iter().enumerate() {
            let gains = panner.handle_or_err(point)?;
            for (l, &g) in gains.iter().enumerate() {
                g_virt[[l, k]] = g;
            }
        }

        Ok(Self { g_virt, num_speakers })
    }

    /// Design a decoder matrix of shape (speakers, channels) for the given
    /// HOA metadata, normalised to unit mean power over the sphere.
    pub fn design(&self, meta: &HoaTypeMetadata) -> RenderResult<Array2<f64>> {
        if meta.orders.len() != meta.degrees.len() {
            return Err(RenderError::Hoa(
                "orders and degrees differ in length".into(),
            ));
        }

        let mut decoder = allrad_design(
            &ALLRAD_POINTS,
            &self.g_virt,
            &meta.orders,
            &meta.degrees,
            meta.normalization,
        )?;

        // normalise so the mean decoded power over the sphere is one
        let num_points = ALLRAD_POINTS.len();
        let mut total_power = 0.0;
        for &point in ALLRAD_POINTS.iter() {
            let (az, el) = point_az_el(point);
            let encoded: Vec<f64> = meta
                .orders
                .iter()
                .zip(&meta.degrees)
                .map(|(&n, &m)| sph_harm(n, m, az, el, meta.normalization))
                .collect::<RenderResult<_>>()?;

            for l in 0..self.num_speakers {
                let v: f64 = encoded
                    .iter()
                    .enumerate()
                    .map(|(c, &e)| decoder[[l, c]] * e)
                    .sum();
                total_power += v * v;
            }
        }
        let mean_power = total_power / num_points as f64;
        decoder.mapv_inplace(|v| v / mean_power.sqrt());

        Ok(decoder)
    }
}

// near-field compensation

/// Roots of the Bessel polynomials used to factor the NFC filters into
/// first/second-order sections, for orders 1 to 4.
const BESSEL_ROOTS: [&[(f64, f64)]; 4] = [
    &[(-1.0, 0.0)],
    &[(-1.5, 0.8660254037844386)],
    &[(-2.3221853546260855, 0.0), (-1.8389073227825574, 1.7543809597837216)],
    &[(-2.8962106028532803, 0.8672341289345038), (-2.1037893971467196, 2.657418041856753)],
];

const SPEED_OF_SOUND: f64 = 340.0;

/// One IIR section in direct form II transposed.
#[derive(Debug, Clone)]
struct Section {
    b: [f64; 3],
    a: [f64; 3],
    state: [f64; 2],
}

impl Section {
    /// Bilinear transform of an analog section
    /// (b2 s^2 + b1 s + b0) / (a2 s^2 + a1 s + a0).
    fn from_analog(b: [f64; 3], a: [f64; 3], sample_rate: f64) -> Self {
        let k = 2.0 * sample_rate;
        let k2 = k * k;

        let b0 = b[2] * k2 + b[1] * k + b[0];
        let b1 = 2.0 * b[0] - 2.0 * b[2] * k2;
        let b2 = b[2] * k2 - b[1] * k + b[0];
        let a0 = a[2] * k2 + a[1] * k + a[0];
        let a1 = 2.0 * a[0] - 2.0 * a[2] * k2;
        let a2 = a[2] * k2 - a[1] * k + a[0];

        Self {
            b: [b0 / a0, b1 / a0, b2 / a0],
            a: [1.0, a1 / a0, a2 / a0],
            state: [0.0, 0.0],
        }
    }

    fn process(&mut self, x: f64) -> f64 {
        let y = self.b[0] * x + self.state[0];
        self.state[0] = self.b[1] * x - self.a[1] * y + self.state[1];
        self.state[1] = self.b[2] * x - self.a[2] * y;
        y
    }
}

/// Near-field compensation filter for one HOA channel.
///
/// The filter compensates a wavefront recorded at `ref_dist` for
/// reproduction at `rep_dist`; each Bessel root contributes a first-order
/// (real root) or second-order (conjugate pair) section.
#[derive(Debug, Clone)]
pub struct NfcFilter {
    sections: Vec<Section>,
}

impl NfcFilter {
    pub fn new(order: i32, ref_dist: f64, rep_dist: f64, sample_rate: f64) -> RenderResult<Self> {
        if order == 0 {
            return Ok(Self { sections: Vec::new() });
        }
        if !(1..=4).contains(&order) {
            return Err(RenderError::Hoa(format!(
                "near-field compensation is tabulated up to order 4, not {}",
                order
            )));
        }

        let a_ref = SPEED_OF_SOUND / (2.0 * ref_dist);
        let a_rep = SPEED_OF_SOUND / (2.0 * rep_dist);

        let sections = BESSEL_ROOTS[(order - 1) as usize]
            .iter()
            .map(|&(re, im)| {
                if im == 0.0 {
                    // (s - x a_ref) / (s - x a_rep)
                    Section::from_analog(
                        [-re * a_ref, 1.0, 0.0],
                        [-re * a_rep, 1.0, 0.0],
                        sample_rate,
                    )
                } else {
                    // conjugate pair:
                    // (s^2 - 2 re a s + |x|^2 a^2) for each distance
                    let mag_sq = re * re + im * im;
                    Section::from_analog(
                        [mag_sq * a_ref * a_ref, -2.0 * re * a_ref, 1.0],
                        [mag_sq * a_rep * a_rep, -2.0 * re * a_rep, 1.0],
                        sample_rate,
                    )
                }
            })
            .collect();

        Ok(Self { sections })
    }

    /// Filter a channel of samples in place.
    pub fn process(&mut self, samples: &mut [f64]) {
        for sample in samples {
            let mut x = *sample;
            for section in &mut self.sections {
                x = section.process(x);
            }
            *sample = x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admr_core::bs2051;
    use admr_core::geom::cart;
    use admr_model::items::ExtraData;
    use crate::point_source::configure;

    /// ACN order/degree pairs up to a given order.
    fn acn_orders_degrees(max_order: i32) -> (Vec<i32>, Vec<i32>) {
        let mut orders = Vec::new();
        let mut degrees = Vec::new();
        for n in 0..=max_order {
            for m in -n..=n {
                orders.push(n);
                degrees.push(m);
            }
        }
        (orders, degrees)
    }

    fn hoa_meta(max_order: i32, normalization: Normalization) -> HoaTypeMetadata {
        let (orders, degrees) = acn_orders_degrees(max_order);
        HoaTypeMetadata {
            rtime: None,
            duration: None,
            orders,
            degrees,
            normalization,
            nfc_ref_dist: None,
            screen_ref: false,
            extra_data: ExtraData::default(),
        }
    }

    #[test]
    fn test_sph_harm_order_zero_is_constant() {
        for &(az, el) in &[(0.0, 0.0), (1.0, 0.5), (-2.0, -1.0)] {
            assert!((sph_harm(0, 0, az, el, Normalization::SN3D).unwrap() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_sph_harm_first_order_directions() {
        // ACN 1..3 are Y, Z, X dipoles in SN3D
        let front = (0.0_f64, 0.0_f64);
        let left = (std::f64::consts::FRAC_PI_2, 0.0);
        let up = (0.0, std::f64::consts::FRAC_PI_2);

        // X (n=1, m=1) points forward
        assert!((sph_harm(1, 1, front.0, front.1, Normalization::SN3D).unwrap() - 1.0).abs() < 1e-12);
        assert!(sph_harm(1, 1, left.0, left.1, Normalization::SN3D).unwrap().abs() < 1e-12);

        // Y (n=1, m=-1) points left
        assert!((sph_harm(1, -1, left.0, left.1, Normalization::SN3D).unwrap() - 1.0).abs() < 1e-12);

        // Z (n=1, m=0) points up
        assert!((sph_harm(1, 0, up.0, up.1, Normalization::SN3D).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_n3d_vs_sn3d() {
        // N3D = SN3D * sqrt(2n + 1)
        for n in 0..4 {
            for m in 0..=n {
                let ratio = norm_n3d(n, m) / norm_sn3d(n, m);
                assert!((ratio - ((2 * n + 1) as f64).sqrt()).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_fuma_only_to_third_order() {
        assert!(norm_fuma(3, 0).is_ok());
        assert!(norm_fuma(4, 0).is_err());
    }

    #[test]
    fn test_decoder_mean_power_is_one() {
        let layout = bs2051::get_layout("4+5+0").unwrap().without_lfe();
        let panner = configure(&layout).unwrap();
        let design = HoaDecoderDesign::new(&panner).unwrap();

        let decoder = design.design(&hoa_meta(1, Normalization::SN3D)).unwrap();
        assert_eq!(decoder.shape(), &[9, 4]);

        // decoded power averaged over the design points should be one
        let mut total = 0.0;
        for &point in ALLRAD_POINTS.iter() {
            let (az, el) = point_az_el(point);
            let encoded: Vec<f64> = (0..4)
                .map(|acn| {
                    let (n, m) = match acn {
                        0 => (0, 0),
                        1 => (1, -1),
                        2 => (1, 0),
                        _ => (1, 1),
                    };
                    sph_harm(n, m, az, el, Normalization::SN3D).unwrap()
                })
                .collect();
            for l in 0..decoder.nrows() {
                let v: f64 = encoded
                    .iter()
                    .enumerate()
                    .map(|(c, &e)| decoder[[l, c]] * e)
                    .sum();
                total += v * v;
            }
        }
        let mean = total / ALLRAD_POINTS.len() as f64;
        assert!((mean - 1.0).abs() < 1e-6, "mean power {}", mean);
    }

    #[test]
    fn test_decoder_front_dominated_by_front_speakers() {
        let layout = bs2051::get_layout("0+5+0").unwrap().without_lfe();
        let panner = configure(&layout).unwrap();
        let design = HoaDecoderDesign::new(&panner).unwrap();
        let decoder = design.design(&hoa_meta(1, Normalization::SN3D)).unwrap();

        // encode a source at the front centre
        let encoded = [1.0, 0.0, 0.0, 1.0]; // W=1, X=1 in SN3D/ACN
        let gains: Vec<f64> = (0..decoder.nrows())
            .map(|l| (0..4).map(|c| decoder[[l, c]] * encoded[c]).sum())
            .collect();

        let centre = layout.channel_index("M+000").unwrap();
        let rear = layout.channel_index("M+110").unwrap();
        assert!(
            gains[centre].abs() > gains[rear].abs(),
            "centre {} rear {}",
            gains[centre],
            gains[rear]
        );
    }

    #[test]
    fn test_decoder_energy_across_directions() {
        let layout = bs2051::get_layout("4+5+0").unwrap().without_lfe();
        let panner = configure(&layout).unwrap();
        let design = HoaDecoderDesign::new(&panner).unwrap();
        let decoder = design.design(&hoa_meta(1, Normalization::SN3D)).unwrap();

        // energy of decoded plane waves over a ring of directions stays
        // close to the mean
        let mut energies = Vec::new();
        for i in 0..100 {
            let az = (i as f64) * 3.6;
            let dir = cart(az, 0.0, 1.0);
            let (az_r, el_r) = point_az_el(dir);

            let encoded = [
                sph_harm(0, 0, az_r, el_r, Normalization::SN3D).unwrap(),
                sph_harm(1, -1, az_r, el_r, Normalization::SN3D).unwrap(),
                sph_harm(1, 0, az_r, el_r, Normalization::SN3D).unwrap(),
                sph_harm(1, 1, az_r, el_r, Normalization::SN3D).unwrap(),
            ];

            let energy: f64 = (0..decoder.nrows())
                .map(|l| {
                    let v: f64 = (0..4).map(|c| decoder[[l, c]] * encoded[c]).sum();
                    v * v
                })
                .sum();
            energies.push(energy);
        }

        let mean = energies.iter().sum::<f64>() / energies.len() as f64;
        for &e in &energies {
            let db = 10.0 * (e / mean).log10();
            assert!(db.abs() < 1.0, "energy spread {} dB", db);
        }
    }

    #[test]
    fn test_nfc_order_zero_is_identity() {
        let mut filter = NfcFilter::new(0, 2.0, 1.0, 48000.0).unwrap();
        let mut samples = vec![1.0, 0.5, -0.25, 0.0];
        let original = samples.clone();
        filter.process(&mut samples);
        assert_eq!(samples, original);
    }

    #[test]
    fn test_nfc_high_frequencies_pass() {
        // at high frequencies the compensation tends to unity; the impulse
        // onset is dominated by high frequencies
        let mut filter = NfcFilter::new(1, 2.0, 1.0, 48000.0).unwrap();
        let mut samples = vec![0.0; 64];
        samples[0] = 1.0;
        filter.process(&mut samples);
        assert!((samples[0] - 1.0).abs() < 0.05, "onset {}", samples[0]);
    }

    #[test]
    fn test_nfc_dc_gain() {
        // at DC the gain tends to (rep/ref)^order
        let mut filter = NfcFilter::new(1, 2.0, 1.0, 48000.0).unwrap();
        let mut samples = vec![1.0; 48000];
        filter.process(&mut samples);
        let settled = samples[47999];
        assert!((settled - 0.5).abs() < 0.01, "dc gain {}", settled);
    }

    #[test]
    fn test_nfc_order_out_of_range() {
        assert!(NfcFilter::new(5, 2.0, 1.0, 48000.0).is_err());
    }
}
