use std::f64::consts::PI;

use glam::{DMat2, DVec2};
use serde::{Deserialize, Serialize};

use crate::errors::ProjectionError;
use crate::projection::PlanarProjection;

/// 地球平均半径（千米），用于大圆距离计算。
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const DEG_TO_RAD: f64 = PI / 180.0;
const RAD_TO_DEG: f64 = 180.0 / PI;

/// 二维点，内部以 `glam::DVec2` 表示。
///
/// 地理坐标下 `x` 为经度、`y` 为纬度（度）；平面坐标下为东/北向（米）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2(pub DVec2);

impl Point2 {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self(DVec2::new(x, y))
    }

    #[inline]
    pub fn from_vec(vec: DVec2) -> Self {
        Self(vec)
    }

    #[inline]
    pub fn x(self) -> f64 {
        self.0.x
    }

    #[inline]
    pub fn y(self) -> f64 {
        self.0.y
    }

    #[inline]
    pub fn translate(self, offset: Vector2) -> Self {
        Self(self.0 + offset.0)
    }

    #[inline]
    pub fn vector_to(self, other: Point2) -> Vector2 {
        Vector2(other.0 - self.0)
    }

    #[inline]
    pub fn as_vec2(self) -> DVec2 {
        self.0
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }

    /// GeoJSON 坐标对 `[x, y]`。
    #[inline]
    pub fn to_array(self) -> [f64; 2] {
        [self.0.x, self.0.y]
    }
}

impl From<DVec2> for Point2 {
    fn from(value: DVec2) -> Self {
        Self::from_vec(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector2(pub DVec2);

impl Vector2 {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self(DVec2::new(x, y))
    }

    #[inline]
    pub fn x(self) -> f64 {
        self.0.x
    }

    #[inline]
    pub fn y(self) -> f64 {
        self.0.y
    }

    #[inline]
    pub fn as_vec2(self) -> DVec2 {
        self.0
    }
}

impl From<DVec2> for Vector2 {
    fn from(value: DVec2) -> Self {
        Self(value)
    }
}

/// 角度值，同时保存度与弧度两种表示。不做 [0, 360) 归一化。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Angle {
    degrees: f64,
    radians: f64,
}

impl Angle {
    #[inline]
    pub fn from_degrees(degrees: f64) -> Self {
        Self {
            degrees,
            radians: degrees * DEG_TO_RAD,
        }
    }

    #[inline]
    pub fn from_radians(radians: f64) -> Self {
        Self {
            degrees: radians * RAD_TO_DEG,
            radians,
        }
    }

    #[inline]
    pub fn degrees(self) -> f64 {
        self.degrees
    }

    #[inline]
    pub fn radians(self) -> f64 {
        self.radians
    }
}

/// 对单位空间中的四个角点施加 2x2 线性变换与平移。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineQuad {
    pub corners: [Point2; 4],
}

impl AffineQuad {
    pub fn new(corners: [Point2; 4], linear: DMat2, translate: DVec2) -> Self {
        Self {
            corners: corners.map(|corner| Point2::from_vec(linear * corner.as_vec2() + translate)),
        }
    }

    /// 由地理坐标下的两个对角点与变换矩阵恢复旋转矩形的四个真实角点。
    ///
    /// 先投影到平面坐标系求出宽高，在局部空间构造
    /// `(0,0) (dx,0) (dx,dy) (0,dy)`，平移到左下角后再逐点反投影。
    pub fn rotated_box(
        lower_left: Point2,
        upper_right: Point2,
        linear: DMat2,
        projection: &dyn PlanarProjection,
    ) -> Result<[Point2; 4], ProjectionError> {
        let lower_left = projection.to_planar(lower_left)?;
        let upper_right = projection.to_planar(upper_right)?;
        let delta = lower_left.vector_to(upper_right);
        let (dx, dy) = (delta.x(), delta.y());
        let quad = Self::new(
            [
                Point2::new(0.0, 0.0),
                Point2::new(dx, 0.0),
                Point2::new(dx, dy),
                Point2::new(0.0, dy),
            ],
            linear,
            lower_left.as_vec2(),
        );
        let [a, b, c, d] = quad.corners;
        Ok([
            projection.to_geographic(a)?,
            projection.to_geographic(b)?,
            projection.to_geographic(c)?,
            projection.to_geographic(d)?,
        ])
    }
}

/// 两个地理坐标点之间的球面中点，以及弧/椭圆重建所用的半径。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GreatCircleMidpoint {
    pub midpoint: Point2,
    /// 千米。
    pub radius_km: f64,
}

impl GreatCircleMidpoint {
    pub fn new(first: Point2, second: Point2) -> Self {
        let lat1 = Angle::from_degrees(first.y()).radians();
        let lat2 = Angle::from_degrees(second.y()).radians();
        let lon1 = Angle::from_degrees(first.x()).radians();
        let lon2 = Angle::from_degrees(second.x()).radians();

        let d_lon = lon2 - lon1;
        let bx = lat2.cos() * d_lon.cos();
        let by = lat2.cos() * d_lon.sin();
        let lat3 = (lat1.sin() + lat2.sin())
            .atan2(((lat1.cos() + bx) * (lat1.cos() + bx) + by * by).sqrt());
        let lon3 = lon1 + by.atan2(lat1.cos() + bx);

        // 半径沿子午线量取：包围盒定义的圆由此得到半高。
        let d_lat = lat3 - lat2;
        let a = (d_lat / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        Self {
            midpoint: Point2::new(
                Angle::from_radians(lon3).degrees(),
                Angle::from_radians(lat3).degrees(),
            ),
            radius_km: EARTH_RADIUS_KM * c,
        }
    }
}

/// 打包的 32 位 ARGB 颜色。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArgbColor {
    pub alpha: f64,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl ArgbColor {
    /// 输入可能以有符号 32 位整数形式出现，只取低 32 位。
    pub fn from_packed(value: i64) -> Self {
        let bits = value as u32;
        Self {
            alpha: f64::from((bits >> 24) & 0xff) / 255.0,
            red: ((bits >> 16) & 0xff) as u8,
            green: ((bits >> 8) & 0xff) as u8,
            blue: (bits & 0xff) as u8,
        }
    }

    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}
