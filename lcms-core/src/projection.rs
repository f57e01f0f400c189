//! WGS84（EPSG:4326）与荷兰 RD New（EPSG:28992）之间的双向转换。
//!
//! RD New 是 Bessel 1841 椭球上的斜轴立体投影（先映射到 Gauss 保角球面，
//! 再做球面立体投影），与 WGS84 之间通过七参数布尔莎模型换算。
//! 全部参数固定，运行时只计算一次派生常量。

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use glam::DVec3;

use crate::errors::ProjectionError;
use crate::geometry::Point2;

/// 地理坐标（度）与本地平面坐标（米）之间的纯函数转换。
pub trait PlanarProjection: Send + Sync {
    fn to_planar(&self, geographic: Point2) -> Result<Point2, ProjectionError>;
    fn to_geographic(&self, planar: Point2) -> Result<Point2, ProjectionError>;
}

const RD_LAT_0: f64 = 52.156_160_555_555_55;
const RD_LON_0: f64 = 5.387_638_888_888_89;
const RD_K_0: f64 = 0.999_907_9;
const RD_X_0: f64 = 155_000.0;
const RD_Y_0: f64 = 463_000.0;

const BESSEL_A: f64 = 6_377_397.155;
const BESSEL_RF: f64 = 299.152_812_8;
const WGS84_A: f64 = 6_378_137.0;
const WGS84_RF: f64 = 298.257_223_563;

/// dx, dy, dz（米）, rx, ry, rz（角秒）, s（ppm）
const RD_TO_WGS84: [f64; 7] = [
    565.417, 50.3319, 465.552, -0.398957, 0.343988, -1.8774, 4.0725,
];

const SEC_TO_RAD: f64 = PI / (180.0 * 3600.0);
const GAUSS_MAX_ITER: usize = 20;
const GEODETIC_MAX_ITER: usize = 30;
const CONVERGENCE: f64 = 1e-14;

#[derive(Debug, Clone, Copy)]
struct Ellipsoid {
    a: f64,
    es: f64,
    e: f64,
}

impl Ellipsoid {
    fn from_inverse_flattening(a: f64, rf: f64) -> Self {
        let f = 1.0 / rf;
        let es = 2.0 * f - f * f;
        Self { a, es, e: es.sqrt() }
    }

    fn to_geocentric(&self, lon: f64, lat: f64) -> DVec3 {
        let (sin_lat, cos_lat) = lat.sin_cos();
        let n = self.a / (1.0 - self.es * sin_lat * sin_lat).sqrt();
        DVec3::new(
            n * cos_lat * lon.cos(),
            n * cos_lat * lon.sin(),
            n * (1.0 - self.es) * sin_lat,
        )
    }

    /// 返回 (经度, 纬度)，弧度；椭球高被丢弃。
    fn from_geocentric(&self, p: DVec3) -> (f64, f64) {
        let lon = p.y.atan2(p.x);
        let horizontal = (p.x * p.x + p.y * p.y).sqrt();
        let mut lat = p.z.atan2(horizontal * (1.0 - self.es));
        for _ in 0..GEODETIC_MAX_ITER {
            let sin_lat = lat.sin();
            let n = self.a / (1.0 - self.es * sin_lat * sin_lat).sqrt();
            let next = (p.z + self.es * n * sin_lat).atan2(horizontal);
            let done = (next - lat).abs() < CONVERGENCE;
            lat = next;
            if done {
                break;
            }
        }
        (lon, lat)
    }
}

/// 位置矢量约定的七参数变换。
#[derive(Debug, Clone, Copy)]
struct HelmertShift {
    translation: DVec3,
    rotation: DVec3,
    scale: f64,
}

impl HelmertShift {
    fn from_params(params: [f64; 7]) -> Self {
        Self {
            translation: DVec3::new(params[0], params[1], params[2]),
            rotation: DVec3::new(params[3], params[4], params[5]) * SEC_TO_RAD,
            scale: 1.0 + params[6] / 1e6,
        }
    }

    fn forward(&self, p: DVec3) -> DVec3 {
        let r = self.rotation;
        DVec3::new(
            self.scale * (p.x - r.z * p.y + r.y * p.z),
            self.scale * (r.z * p.x + p.y - r.x * p.z),
            self.scale * (-r.y * p.x + r.x * p.y + p.z),
        ) + self.translation
    }

    fn inverse(&self, p: DVec3) -> DVec3 {
        let r = self.rotation;
        let t = (p - self.translation) / self.scale;
        DVec3::new(
            t.x + r.z * t.y - r.y * t.z,
            -r.z * t.x + t.y + r.x * t.z,
            r.y * t.x - r.x * t.y + t.z,
        )
    }
}

/// 椭球到 Gauss 保角球面的映射。
#[derive(Debug, Clone, Copy)]
struct GaussSphere {
    c: f64,
    k: f64,
    ratexp: f64,
    e: f64,
    phic0: f64,
    rc: f64,
}

impl GaussSphere {
    fn new(ellipsoid: &Ellipsoid, lat0: f64) -> Self {
        let es = ellipsoid.es;
        let e = ellipsoid.e;
        let sphi = lat0.sin();
        let cphi = lat0.cos().powi(2);
        let rc = (1.0 - es).sqrt() / (1.0 - es * sphi * sphi);
        let c = (1.0 + es * cphi * cphi / (1.0 - es)).sqrt();
        let phic0 = (sphi / c).asin();
        let ratexp = 0.5 * c * e;
        let k = (0.5 * phic0 + FRAC_PI_4).tan()
            / ((0.5 * lat0 + FRAC_PI_4).tan().powf(c) * srat(e * sphi, ratexp));
        Self {
            c,
            k,
            ratexp,
            e,
            phic0,
            rc,
        }
    }

    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let lat_c = 2.0
            * (self.k * (0.5 * lat + FRAC_PI_4).tan().powf(self.c) * srat(self.e * lat.sin(), self.ratexp))
                .atan()
            - FRAC_PI_2;
        (self.c * lon, lat_c)
    }

    fn inverse(&self, lon_c: f64, lat_c: f64) -> (f64, f64) {
        let lon = lon_c / self.c;
        let num = ((0.5 * lat_c + FRAC_PI_4).tan() / self.k).powf(1.0 / self.c);
        let mut lat = lat_c;
        for _ in 0..GAUSS_MAX_ITER {
            let next = 2.0 * (num * srat(self.e * lat.sin(), -0.5 * self.e)).atan() - FRAC_PI_2;
            let done = (next - lat).abs() < CONVERGENCE;
            lat = next;
            if done {
                break;
            }
        }
        (lon, lat)
    }
}

fn srat(esinp: f64, exp: f64) -> f64 {
    ((1.0 - esinp) / (1.0 + esinp)).powf(exp)
}

fn adjust_lon(lon: f64) -> f64 {
    if lon.abs() <= PI {
        lon
    } else {
        lon - (lon / (2.0 * PI)).round() * 2.0 * PI
    }
}

/// RD New ⇄ WGS84。构造一次后按引用传递，自身无可变状态。
#[derive(Debug, Clone, Copy)]
pub struct RdNewProjection {
    bessel: Ellipsoid,
    wgs84: Ellipsoid,
    shift: HelmertShift,
    gauss: GaussSphere,
    lon0: f64,
    sinc0: f64,
    cosc0: f64,
    r2: f64,
}

impl RdNewProjection {
    pub fn new() -> Self {
        let bessel = Ellipsoid::from_inverse_flattening(BESSEL_A, BESSEL_RF);
        let wgs84 = Ellipsoid::from_inverse_flattening(WGS84_A, WGS84_RF);
        let gauss = GaussSphere::new(&bessel, RD_LAT_0.to_radians());
        Self {
            bessel,
            wgs84,
            shift: HelmertShift::from_params(RD_TO_WGS84),
            gauss,
            lon0: RD_LON_0.to_radians(),
            sinc0: gauss.phic0.sin(),
            cosc0: gauss.phic0.cos(),
            r2: 2.0 * gauss.rc,
        }
    }

    fn stereographic_forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (lon_c, lat_c) = self.gauss.forward(adjust_lon(lon - self.lon0), lat);
        let (sinc, cosc) = lat_c.sin_cos();
        let cosl = lon_c.cos();
        let k = RD_K_0 * self.r2 / (1.0 + self.sinc0 * sinc + self.cosc0 * cosc * cosl);
        let x = k * cosc * lon_c.sin();
        let y = k * (self.cosc0 * sinc - self.sinc0 * cosc * cosl);
        (self.bessel.a * x + RD_X_0, self.bessel.a * y + RD_Y_0)
    }

    fn stereographic_inverse(&self, easting: f64, northing: f64) -> (f64, f64) {
        let x = (easting - RD_X_0) / self.bessel.a / RD_K_0;
        let y = (northing - RD_Y_0) / self.bessel.a / RD_K_0;
        let rho = (x * x + y * y).sqrt();
        let (lon_c, lat_c) = if rho > 0.0 {
            let c = 2.0 * rho.atan2(self.r2);
            let (sinc, cosc) = c.sin_cos();
            (
                (x * sinc).atan2(rho * self.cosc0 * cosc - y * self.sinc0 * sinc),
                (cosc * self.sinc0 + y * sinc * self.cosc0 / rho).asin(),
            )
        } else {
            (0.0, self.gauss.phic0)
        };
        let (lon, lat) = self.gauss.inverse(lon_c, lat_c);
        (adjust_lon(lon + self.lon0), lat)
    }
}

impl Default for RdNewProjection {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanarProjection for RdNewProjection {
    fn to_planar(&self, geographic: Point2) -> Result<Point2, ProjectionError> {
        ensure_finite(geographic)?;
        let wgs = self
            .wgs84
            .to_geocentric(geographic.x().to_radians(), geographic.y().to_radians());
        let (lon, lat) = self.bessel.from_geocentric(self.shift.inverse(wgs));
        let (x, y) = self.stereographic_forward(lon, lat);
        Ok(Point2::new(x, y))
    }

    fn to_geographic(&self, planar: Point2) -> Result<Point2, ProjectionError> {
        ensure_finite(planar)?;
        let (lon, lat) = self.stereographic_inverse(planar.x(), planar.y());
        let bessel = self.bessel.to_geocentric(lon, lat);
        let (lon, lat) = self.wgs84.from_geocentric(self.shift.forward(bessel));
        Ok(Point2::new(lon.to_degrees(), lat.to_degrees()))
    }
}

fn ensure_finite(point: Point2) -> Result<(), ProjectionError> {
    if point.is_finite() {
        Ok(())
    } else {
        Err(ProjectionError::NonFinite {
            x: point.x(),
            y: point.y(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rd_origin_maps_to_amersfoort() {
        let projection = RdNewProjection::new();
        let geo = projection
            .to_geographic(Point2::new(RD_X_0, RD_Y_0))
            .expect("project origin");
        assert!((geo.x() - 5.387_206).abs() < 2e-5, "lon = {}", geo.x());
        assert!((geo.y() - 52.155_174).abs() < 2e-5, "lat = {}", geo.y());
    }

    #[test]
    fn round_trip_stays_within_tolerance() {
        let projection = RdNewProjection::new();
        let samples = [
            Point2::new(5.0, 52.0),
            Point2::new(5.1, 52.1),
            Point2::new(3.4, 51.3),
            Point2::new(7.2, 53.5),
            Point2::new(4.895_168, 52.370_216),
        ];
        for sample in samples {
            let planar = projection.to_planar(sample).expect("to planar");
            let back = projection.to_geographic(planar).expect("to geographic");
            assert!((back.x() - sample.x()).abs() < 1e-6, "{sample:?} -> {back:?}");
            assert!((back.y() - sample.y()).abs() < 1e-6, "{sample:?} -> {back:?}");
        }
    }

    #[test]
    fn planar_distances_are_metric() {
        let projection = RdNewProjection::new();
        let a = projection.to_planar(Point2::new(5.0, 52.0)).unwrap();
        let b = projection.to_planar(Point2::new(5.0, 52.01)).unwrap();
        let distance = a.vector_to(b).as_vec2().length();
        // 0.01° 纬度约 1113 m
        assert!((distance - 1113.0).abs() < 5.0, "distance = {distance}");
    }

    #[test]
    fn non_finite_input_is_rejected() {
        let projection = RdNewProjection::new();
        let err = projection
            .to_planar(Point2::new(f64::NAN, 52.0))
            .unwrap_err();
        assert!(matches!(err, ProjectionError::NonFinite { .. }));
        assert!(projection
            .to_geographic(Point2::new(f64::INFINITY, 0.0))
            .is_err());
    }
}
