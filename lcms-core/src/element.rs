use std::collections::BTreeMap;
use std::ops::Index;

use crate::entity::{Entity, EntityKind, RawPoint, linear_or_identity};
use crate::errors::BuildError;
use crate::geometry::{AffineQuad, Angle, ArgbColor, GreatCircleMidpoint, Point2, Vector2};
use crate::projection::PlanarProjection;

/// 元素在所属 `ElementTree` 中的下标。父引用只保存下标，不拥有对方。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementIndex(usize);

impl ElementIndex {
    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

/// 解析后的图元：标识、所属动作图层、父元素、属性表与几何变体。
#[derive(Debug, Clone)]
pub struct Element {
    pub id: String,
    pub layer_id: String,
    pub parent: Option<ElementIndex>,
    pub attributes: BTreeMap<String, String>,
    pub shape: Shape,
}

impl Element {
    pub fn kind(&self) -> EntityKind {
        self.shape.kind()
    }

    pub fn as_part(&self) -> Option<&PartShape> {
        match &self.shape {
            Shape::Part(part) => Some(part),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Shape {
    Line(LineShape),
    PolyLine(PolyLineShape),
    Rectangle(RectangleShape),
    Arc(ArcShape),
    Part(PartShape),
    Symbol(SymbolShape),
    PolyArrow(BaseShape),
    StrokeText(BaseShape),
    Image(BaseShape),
    Contour(BaseShape),
}

/// 父元素可提供给 Symbol 的上下文。
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolContext<'a> {
    pub parent_name: Option<&'a str>,
    pub parent_origin: Option<Point2>,
    pub pixel_scale: f64,
}

impl Shape {
    /// 按类型标签分派到对应变体的构造函数。
    pub fn from_entity(
        kind: EntityKind,
        id: &str,
        entity: &Entity,
        context: SymbolContext<'_>,
        projection: &dyn PlanarProjection,
    ) -> Result<Self, BuildError> {
        let shape = match kind {
            EntityKind::Line => Shape::Line(LineShape::from_entity(entity)),
            EntityKind::PolyLine => Shape::PolyLine(PolyLineShape::from_entity(entity)),
            EntityKind::Rectangle => {
                Shape::Rectangle(RectangleShape::from_entity(id, entity, projection)?)
            }
            EntityKind::Arc => Shape::Arc(ArcShape::from_entity(id, entity, projection)?),
            EntityKind::Part => Shape::Part(PartShape::from_entity(entity)),
            EntityKind::Symbol => {
                Shape::Symbol(SymbolShape::from_entity(entity, context, projection)?)
            }
            EntityKind::PolyArrow => Shape::PolyArrow(BaseShape::from_entity(entity)),
            EntityKind::StrokeText => Shape::StrokeText(BaseShape::from_entity(entity)),
            EntityKind::Image => Shape::Image(BaseShape::from_entity(entity)),
            EntityKind::Contour => Shape::Contour(BaseShape::from_entity(entity)),
        };
        Ok(shape)
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Shape::Line(_) => EntityKind::Line,
            Shape::PolyLine(_) => EntityKind::PolyLine,
            Shape::Rectangle(_) => EntityKind::Rectangle,
            Shape::Arc(_) => EntityKind::Arc,
            Shape::Part(_) => EntityKind::Part,
            Shape::Symbol(_) => EntityKind::Symbol,
            Shape::PolyArrow(_) => EntityKind::PolyArrow,
            Shape::StrokeText(_) => EntityKind::StrokeText,
            Shape::Image(_) => EntityKind::Image,
            Shape::Contour(_) => EntityKind::Contour,
        }
    }

    /// 多边形外环（地理坐标）。点状或容器变体返回 None。
    pub fn ring(&self) -> Option<Vec<Point2>> {
        match self {
            Shape::Line(line) => line.ring(),
            Shape::PolyLine(polyline) => polyline.ring(),
            Shape::Rectangle(rectangle) => Some(rectangle.ring()),
            Shape::Arc(arc) => Some(arc.ring.clone()),
            Shape::Part(_) | Shape::Symbol(_) => None,
            Shape::PolyArrow(base)
            | Shape::StrokeText(base)
            | Shape::Image(base)
            | Shape::Contour(base) => base.points.clone(),
        }
    }
}

fn require(point: Option<RawPoint>, id: &str, field: &'static str) -> Result<Point2, BuildError> {
    point.map(Point2::from).ok_or_else(|| BuildError::MissingGeometry {
        id: id.to_string(),
        field,
    })
}

/// 线段。按下游约定始终输出闭合多边形环 `[p1, p2, p1]`，不输出 LineString。
#[derive(Debug, Clone)]
pub struct LineShape {
    pub endpoints: Option<[Point2; 2]>,
}

impl LineShape {
    fn from_entity(entity: &Entity) -> Self {
        let endpoints = match (entity.point1, entity.point2) {
            (Some(first), Some(second)) => Some([first.into(), second.into()]),
            _ => None,
        };
        Self { endpoints }
    }

    pub fn ring(&self) -> Option<Vec<Point2>> {
        self.endpoints
            .map(|[first, second]| vec![first, second, first])
    }
}

#[derive(Debug, Clone)]
pub struct PolyLineShape {
    pub points: Vec<Point2>,
}

impl PolyLineShape {
    fn from_entity(entity: &Entity) -> Self {
        Self {
            points: entity.points().unwrap_or_default(),
        }
    }

    pub fn ring(&self) -> Option<Vec<Point2>> {
        if self.points.is_empty() {
            None
        } else {
            Some(self.points.clone())
        }
    }
}

/// 由两个对角点与变换矩阵定义的旋转矩形。
#[derive(Debug, Clone)]
pub struct RectangleShape {
    pub corners: [Point2; 4],
}

impl RectangleShape {
    fn from_entity(
        id: &str,
        entity: &Entity,
        projection: &dyn PlanarProjection,
    ) -> Result<Self, BuildError> {
        let lower_left = require(entity.point1, id, "point1")?;
        let upper_right = require(entity.point2, id, "point2")?;
        let corners = AffineQuad::rotated_box(
            lower_left,
            upper_right,
            linear_or_identity(entity.transform),
            projection,
        )?;
        Ok(Self { corners })
    }

    /// 四个角点加首点闭合，共 5 个坐标对。
    pub fn ring(&self) -> Vec<Point2> {
        let mut ring = self.corners.to_vec();
        ring.push(self.corners[0]);
        ring
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcMode {
    Circle,
    Ellipse,
}

/// 圆弧或椭圆，在平面坐标系中离散后反投影。
#[derive(Debug, Clone)]
pub struct ArcShape {
    pub mode: ArcMode,
    pub ring: Vec<Point2>,
}

impl ArcShape {
    pub const CIRCLE_VERTICES: usize = 50;
    const MAX_ELLIPSE_RATIO: f64 = 100.0;
    /// (起始角, 终止角, 是否为长轴端点附近的高曲率段)
    const ELLIPSE_BANDS: [(f64, f64, bool); 4] = [
        (-30.0, 30.0, true),
        (30.0, 150.0, false),
        (150.0, 210.0, true),
        (210.0, 330.0, false),
    ];

    fn from_entity(
        id: &str,
        entity: &Entity,
        projection: &dyn PlanarProjection,
    ) -> Result<Self, BuildError> {
        let first = require(entity.point1, id, "point1")?;
        let second = require(entity.point2, id, "point2")?;
        let midpoint = GreatCircleMidpoint::new(first, second);
        let origin = projection.to_planar(midpoint.midpoint)?;
        let first = projection.to_planar(first)?;
        let second = projection.to_planar(second)?;

        let dx = first.x() - second.x();
        let dy = first.y() - second.y();
        if dx.floor().abs() == dy.floor().abs() {
            Self::circle(
                origin,
                midpoint.radius_km,
                entity.start.unwrap_or(0.0),
                entity.extent.unwrap_or(360.0),
                projection,
            )
        } else {
            Self::ellipse(origin, dx / 2.0, dy / 2.0, projection)
        }
    }

    /// `extent` 小于 360° 时从 `start` 扫到 `start + extent`，否则从 0° 画整圆。
    /// 顶点为 `origin + r·(cos θ, −sin θ)`，共 `CIRCLE_VERTICES + 1` 个。
    pub fn circle(
        origin: Point2,
        radius_km: f64,
        start: f64,
        extent: f64,
        projection: &dyn PlanarProjection,
    ) -> Result<Self, BuildError> {
        let (start, sweep) = if extent < 360.0 {
            (start, extent)
        } else {
            (0.0, 360.0)
        };
        let radius = 1e3 * radius_km;
        let mut ring = Vec::with_capacity(Self::CIRCLE_VERTICES + 1);
        for k in 0..=Self::CIRCLE_VERTICES {
            let theta = Angle::from_degrees(
                start + k as f64 * sweep / Self::CIRCLE_VERTICES as f64,
            )
            .radians();
            let offset = Vector2::new(radius * theta.cos(), -radius * theta.sin());
            ring.push(projection.to_geographic(origin.translate(offset))?);
        }
        Ok(Self {
            mode: ArcMode::Circle,
            ring,
        })
    }

    /// 按半轴比分配采样密度：长轴两端的两个段比两侧段多 `(ratio - 1)` 倍采样。
    pub fn ellipse(
        origin: Point2,
        semi_x: f64,
        semi_y: f64,
        projection: &dyn PlanarProjection,
    ) -> Result<Self, BuildError> {
        let a = semi_x.abs();
        let b = semi_y.abs();
        let ratio = if b > 0.0 {
            (a / b).ceil().clamp(1.0, Self::MAX_ELLIPSE_RATIO)
        } else {
            Self::MAX_ELLIPSE_RATIO
        };
        let base = Self::CIRCLE_VERTICES as f64;
        let vertices = if ratio > 10.0 {
            base * (ratio / 10.0).floor() * 10.0
        } else {
            base
        };
        let split = vertices / (2.0 * ratio);
        // 步数向下取整，每段采样数为步数 + 1
        let cap_steps = (split * (ratio - 1.0)).floor() as usize;
        let side_steps = split.floor() as usize;

        let mut ring = Vec::new();
        for (start, end, is_cap) in Self::ELLIPSE_BANDS {
            let steps = if is_cap { cap_steps } else { side_steps };
            for theta in band_angles(start, end, steps) {
                let theta = Angle::from_degrees(theta).radians();
                let r = polar_radius(a, b, theta);
                let offset = Vector2::new(r * theta.cos(), r * theta.sin());
                ring.push(projection.to_geographic(origin.translate(offset))?);
            }
        }
        Ok(Self {
            mode: ArcMode::Ellipse,
            ring,
        })
    }
}

/// 含两端点；0 步时只取起点。
fn band_angles(start: f64, end: f64, steps: usize) -> impl Iterator<Item = f64> {
    let step = if steps == 0 {
        0.0
    } else {
        (end - start) / steps as f64
    };
    (0..=steps).map(move |i| start + i as f64 * step)
}

fn polar_radius(a: f64, b: f64, theta: f64) -> f64 {
    let denom = ((b * theta.cos()).powi(2) + (a * theta.sin()).powi(2)).sqrt();
    if denom <= f64::EPSILON {
        a.max(b)
    } else {
        a * b / denom
    }
}

/// 容器元素，自身没有几何。
#[derive(Debug, Clone)]
pub struct PartShape {
    pub name: Option<String>,
    pub origin: Option<Point2>,
    pub pixel_scale: f64,
    pub children: Vec<ElementIndex>,
}

impl PartShape {
    fn from_entity(entity: &Entity) -> Self {
        Self {
            name: entity.name.clone(),
            origin: entity.origin.map(Point2::from),
            pixel_scale: entity.pixel_scale.map_or(0.0, |scale| scale.value()),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    pub color: String,
    pub transparency: f64,
}

impl Default for Background {
    fn default() -> Self {
        Self {
            color: "#000000".to_string(),
            transparency: 0.0,
        }
    }
}

impl From<ArgbColor> for Background {
    fn from(color: ArgbColor) -> Self {
        Self {
            color: color.hex(),
            transparency: color.alpha,
        }
    }
}

/// 点状图标。
#[derive(Debug, Clone)]
pub struct SymbolShape {
    pub origin: Option<Point2>,
    pub label: String,
    pub symbol_id: Option<String>,
    pub download_location: Option<String>,
    pub background: Background,
    pub image_type: Option<String>,
}

impl SymbolShape {
    fn from_entity(
        entity: &Entity,
        context: SymbolContext<'_>,
        projection: &dyn PlanarProjection,
    ) -> Result<Self, BuildError> {
        let text = entity
            .text
            .as_ref()
            .and_then(|block| block.text.as_deref())
            .map(trim_line_breaks)
            .unwrap_or_default()
            .to_string();

        let background = match entity.text.as_ref().and_then(|block| block.style.as_ref()) {
            Some(style) if style.has_balloon() => {
                Background::from(ArgbColor::from_packed(style.balloon_color().unwrap_or(0)))
            }
            _ => Background::default(),
        };

        let origin = match context.parent_origin {
            Some(parent_origin) if context.pixel_scale != 0.0 => Some(parent_origin),
            _ => Self::box_center(entity, projection)?,
        };

        let symbol = entity.symbol.as_ref();
        Ok(Self {
            origin,
            label: compose_label(context.parent_name, &text),
            symbol_id: symbol.and_then(|symbol| symbol.symbol_id.clone()),
            download_location: symbol
                .and_then(|symbol| symbol.download_location.clone())
                .filter(|location| !location.is_empty()),
            background,
            image_type: entity.attributes.first().map(|group| group.name.clone()),
        })
    }

    fn box_center(
        entity: &Entity,
        projection: &dyn PlanarProjection,
    ) -> Result<Option<Point2>, BuildError> {
        let Some(symbol) = entity.symbol.as_ref() else {
            return Ok(None);
        };
        let (Some(lower_left), Some(upper_right)) = (symbol.lower_left, symbol.upper_right) else {
            return Ok(None);
        };
        let corners = AffineQuad::rotated_box(
            lower_left.into(),
            upper_right.into(),
            linear_or_identity(symbol.transform),
            projection,
        )?;
        Ok(Some(GreatCircleMidpoint::new(corners[0], corners[2]).midpoint))
    }
}

/// 去掉首尾的换行，保留中间的空行。
pub fn trim_line_breaks(text: &str) -> &str {
    text.trim_matches(|c| c == '\n' || c == '\r')
}

fn compose_label(parent_name: Option<&str>, text: &str) -> String {
    let parent_name = parent_name.unwrap_or_default();
    match (parent_name.is_empty(), text.is_empty()) {
        (_, true) => parent_name.to_string(),
        (true, false) => text.to_string(),
        (false, false) => format!("{parent_name}, {text}"),
    }
}

/// PolyArrow / StrokeText / Image / Contour 只保留实体直接给出的点列。
#[derive(Debug, Clone)]
pub struct BaseShape {
    pub points: Option<Vec<Point2>>,
}

impl BaseShape {
    fn from_entity(entity: &Entity) -> Self {
        Self {
            points: entity.points(),
        }
    }
}

/// 单个动作图层的元素森林。元素按插入顺序存放，父子关系均以下标表示。
#[derive(Debug, Clone, Default)]
pub struct ElementTree {
    nodes: Vec<Element>,
    roots: Vec<ElementIndex>,
}

impl ElementTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, element: Element) -> ElementIndex {
        let index = ElementIndex(self.nodes.len());
        self.nodes.push(element);
        index
    }

    pub fn set_roots(&mut self, roots: Vec<ElementIndex>) {
        self.roots = roots;
    }

    /// 为容器挂接子元素；非容器下标被忽略。
    pub fn attach_children(&mut self, part: ElementIndex, children: Vec<ElementIndex>) {
        if let Some(Element {
            shape: Shape::Part(shape),
            ..
        }) = self.nodes.get_mut(part.0)
        {
            shape.children = children;
        }
    }

    #[inline]
    pub fn get(&self, index: ElementIndex) -> Option<&Element> {
        self.nodes.get(index.0)
    }

    #[inline]
    pub fn roots(&self) -> &[ElementIndex] {
        &self.roots
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementIndex, &Element)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, element)| (ElementIndex(i), element))
    }

    pub fn parent(&self, index: ElementIndex) -> Option<&Element> {
        self.get(index)
            .and_then(|element| element.parent)
            .and_then(|parent| self.get(parent))
    }

    /// 自身或最近一个显式声明非零 pixelScale 的祖先容器的值；都没有时为 0。
    pub fn pixel_scale(&self, index: ElementIndex) -> f64 {
        let mut current = Some(index);
        while let Some(at) = current {
            let Some(element) = self.get(at) else {
                break;
            };
            if let Some(part) = element.as_part() {
                if part.pixel_scale != 0.0 {
                    return part.pixel_scale;
                }
            }
            current = element.parent;
        }
        0.0
    }

    /// 自身及全部后代的标识，嵌套容器递归展开。
    pub fn all_ids(&self, index: ElementIndex) -> Vec<&str> {
        let mut ids = Vec::new();
        self.collect_ids(index, &mut ids);
        ids
    }

    fn collect_ids<'a>(&'a self, index: ElementIndex, ids: &mut Vec<&'a str>) {
        let Some(element) = self.get(index) else {
            return;
        };
        ids.push(&element.id);
        if let Some(part) = element.as_part() {
            for child in &part.children {
                self.collect_ids(*child, ids);
            }
        }
    }

    /// 深度优先展开容器，只返回非容器元素；非容器自身即为唯一叶子。
    pub fn leaves(&self, index: ElementIndex) -> Vec<ElementIndex> {
        let mut leaves = Vec::new();
        self.collect_leaves(index, &mut leaves);
        leaves
    }

    fn collect_leaves(&self, index: ElementIndex, leaves: &mut Vec<ElementIndex>) {
        match self.get(index).and_then(Element::as_part) {
            Some(part) => {
                for child in &part.children {
                    self.collect_leaves(*child, leaves);
                }
            }
            None if self.get(index).is_some() => leaves.push(index),
            None => {}
        }
    }

    /// 为挂在 `parent` 下的 Symbol 准备上下文。
    pub fn symbol_context(&self, parent: Option<ElementIndex>) -> SymbolContext<'_> {
        let Some(parent) = parent else {
            return SymbolContext::default();
        };
        match self.get(parent).and_then(Element::as_part) {
            Some(part) => SymbolContext {
                parent_name: part.name.as_deref(),
                parent_origin: part.origin,
                pixel_scale: self.pixel_scale(parent),
            },
            None => SymbolContext::default(),
        }
    }
}

impl Index<ElementIndex> for ElementTree {
    type Output = Element;

    fn index(&self, index: ElementIndex) -> &Self::Output {
        &self.nodes[index.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{SymbolRef, TextBlock, TextStyle, FillType, Paint};
    use crate::projection::RdNewProjection;

    fn element(id: &str, parent: Option<ElementIndex>, shape: Shape) -> Element {
        Element {
            id: id.to_string(),
            layer_id: "AL1".to_string(),
            parent,
            attributes: BTreeMap::new(),
            shape,
        }
    }

    fn part(name: &str, pixel_scale: f64) -> Shape {
        Shape::Part(PartShape {
            name: Some(name.to_string()),
            origin: Some(Point2::new(5.2, 52.3)),
            pixel_scale,
            children: Vec::new(),
        })
    }

    #[test]
    fn line_ring_is_closed_polygon() {
        let entity = Entity {
            point1: Some(RawPoint { x: 5.0, y: 52.0 }),
            point2: Some(RawPoint { x: 5.1, y: 52.1 }),
            ..Entity::default()
        };
        let ring = LineShape::from_entity(&entity).ring().expect("ring");
        assert_eq!(ring.len(), 3);
        assert_eq!(ring[0], ring[2]);
        assert_eq!(ring[1], Point2::new(5.1, 52.1));

        assert!(LineShape::from_entity(&Entity::default()).ring().is_none());
    }

    #[test]
    fn rectangle_ring_has_five_closed_pairs() {
        let projection = RdNewProjection::new();
        let entity = Entity {
            point1: Some(RawPoint { x: 5.0, y: 52.0 }),
            point2: Some(RawPoint { x: 5.01, y: 52.005 }),
            transform: Some(crate::entity::TransformMatrix {
                m00: 0.866_025_403_784_438_6,
                m10: 0.5,
                m01: -0.5,
                m11: 0.866_025_403_784_438_6,
            }),
            ..Entity::default()
        };
        let rectangle =
            RectangleShape::from_entity("r1", &entity, &projection).expect("rectangle");
        let ring = rectangle.ring();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring[0], ring[4]);
        assert!((ring[0].x() - 5.0).abs() < 1e-7);
        assert!((ring[0].y() - 52.0).abs() < 1e-7);
    }

    #[test]
    fn rectangle_without_corners_is_rejected() {
        let projection = RdNewProjection::new();
        let err = RectangleShape::from_entity("r1", &Entity::default(), &projection)
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::MissingGeometry { field: "point1", .. }
        ));
    }

    #[test]
    fn full_circle_has_fifty_one_vertices() {
        let projection = RdNewProjection::new();
        let origin = Point2::new(155_000.0, 463_000.0);
        let arc = ArcShape::circle(origin, 0.1, 45.0, 360.0, &projection).expect("circle");
        assert_eq!(arc.mode, ArcMode::Circle);
        assert_eq!(arc.ring.len(), 51);
        let first = arc.ring.first().unwrap();
        let last = arc.ring.last().unwrap();
        assert!((first.x() - last.x()).abs() < 1e-9);
        assert!((first.y() - last.y()).abs() < 1e-9);

        // 整圆从 0° 开始：首点位于圆心正东方向
        let planar = projection.to_planar(*first).unwrap();
        assert!((planar.x() - 155_100.0).abs() < 1e-2);
        assert!((planar.y() - 463_000.0).abs() < 1e-2);
    }

    #[test]
    fn partial_arc_starts_at_start_angle() {
        let projection = RdNewProjection::new();
        let origin = Point2::new(155_000.0, 463_000.0);
        let arc = ArcShape::circle(origin, 0.1, 90.0, 90.0, &projection).expect("arc");
        assert_eq!(arc.ring.len(), 51);
        let first = projection.to_planar(arc.ring[0]).unwrap();
        // θ = 90° → (cos, −sin) = (0, −1)
        assert!((first.x() - 155_000.0).abs() < 1e-2);
        assert!((first.y() - 462_900.0).abs() < 1e-2);
        let last = projection.to_planar(*arc.ring.last().unwrap()).unwrap();
        assert!((last.x() - 154_900.0).abs() < 1e-2);
        assert!((last.y() - 463_000.0).abs() < 1e-2);
    }

    #[test]
    fn ellipse_samples_follow_band_budget() {
        let projection = RdNewProjection::new();
        let origin = Point2::new(155_000.0, 463_000.0);
        // ratio = 2: split = 12.5 → 每段 12 步，13 个采样
        let arc = ArcShape::ellipse(origin, -200.0, 100.0, &projection).expect("ellipse");
        assert_eq!(arc.mode, ArcMode::Ellipse);
        assert_eq!(arc.ring.len(), 4 * 13);

        let first = projection.to_planar(arc.ring[0]).unwrap();
        let last = projection.to_planar(*arc.ring.last().unwrap()).unwrap();
        assert!((first.x() - last.x()).abs() < 1e-2);
        assert!((first.y() - last.y()).abs() < 1e-2);

        for point in &arc.ring {
            let planar = projection.to_planar(*point).unwrap();
            let local = planar.as_vec2() - origin.as_vec2();
            let norm = (local.x / 200.0).powi(2) + (local.y / 100.0).powi(2);
            assert!((norm - 1.0).abs() < 1e-4, "norm = {norm}");
        }
    }

    #[test]
    fn elongated_ellipse_scales_vertex_count() {
        let projection = RdNewProjection::new();
        let origin = Point2::new(155_000.0, 463_000.0);
        // ratio = 20: 顶点预算 50·20 = 1000，split = 25；端段 475 步，侧段 25 步
        let arc = ArcShape::ellipse(origin, 2_000.0, 100.0, &projection).expect("ellipse");
        assert_eq!(arc.ring.len(), 2 * 476 + 2 * 26);
    }

    #[test]
    fn fractional_split_rounds_steps_down() {
        let projection = RdNewProjection::new();
        let origin = Point2::new(155_000.0, 463_000.0);
        // ratio = 3: split = 50/6 ≈ 8.33 → 侧段 8 步，端段 16.67 → 16 步
        let arc = ArcShape::ellipse(origin, 300.0, 100.0, &projection).expect("ellipse");
        assert_eq!(arc.ring.len(), 2 * 17 + 2 * 9);

        let first = projection.to_planar(arc.ring[0]).unwrap();
        let last = projection.to_planar(*arc.ring.last().unwrap()).unwrap();
        assert!((first.x() - last.x()).abs() < 1e-2);
        assert!((first.y() - last.y()).abs() < 1e-2);
    }

    #[test]
    fn pixel_scale_is_inherited_from_nearest_ancestor() {
        let mut tree = ElementTree::new();
        let outer = tree.push(element("outer", None, part("Outer", 2.0)));
        let inner = tree.push(element("inner", Some(outer), part("Inner", 0.0)));
        let leaf = tree.push(element(
            "leaf",
            Some(inner),
            Shape::Image(BaseShape { points: None }),
        ));
        tree.attach_children(outer, vec![inner]);
        tree.attach_children(inner, vec![leaf]);
        tree.set_roots(vec![outer]);

        assert_eq!(tree.pixel_scale(inner), 2.0);
        assert_eq!(tree.pixel_scale(outer), 2.0);
        assert_eq!(tree.all_ids(outer), vec!["outer", "inner", "leaf"]);
        assert_eq!(tree.leaves(outer), vec![leaf]);
        assert_eq!(tree.parent(leaf).map(|e| e.id.as_str()), Some("inner"));

        let context = tree.symbol_context(Some(inner));
        assert_eq!(context.parent_name, Some("Inner"));
        assert_eq!(context.pixel_scale, 2.0);
    }

    #[test]
    fn symbol_uses_parent_origin_when_pixel_anchored() {
        let projection = RdNewProjection::new();
        let entity = Entity {
            symbol: Some(SymbolRef {
                lower_left: Some(RawPoint { x: 4.0, y: 51.0 }),
                upper_right: Some(RawPoint { x: 4.01, y: 51.01 }),
                transform: None,
                download_location: None,
                symbol_id: Some("S1".to_string()),
                alpha: None,
            }),
            ..Entity::default()
        };
        let context = SymbolContext {
            parent_name: Some("Post"),
            parent_origin: Some(Point2::new(5.2, 52.3)),
            pixel_scale: 1.0,
        };
        let symbol = SymbolShape::from_entity(&entity, context, &projection).unwrap();
        assert_eq!(symbol.origin, Some(Point2::new(5.2, 52.3)));

        let geo_anchored = SymbolContext {
            pixel_scale: 0.0,
            ..context
        };
        let symbol = SymbolShape::from_entity(&entity, geo_anchored, &projection).unwrap();
        let origin = symbol.origin.expect("box center");
        assert!((origin.x() - 4.005).abs() < 1e-4);
        assert!((origin.y() - 51.005).abs() < 1e-4);
    }

    #[test]
    fn symbol_label_and_background() {
        let projection = RdNewProjection::new();
        let entity = Entity {
            text: Some(TextBlock {
                text: Some("\r\nCommandopost\n\nWest\n\n".to_string()),
                style: Some(TextStyle {
                    style_name: None,
                    balloon_type: Some(1.0),
                    balloon_fill_type: Some(FillType {
                        paint: Some(Paint {
                            color1: Some(0xff00_80ff),
                        }),
                    }),
                }),
            }),
            ..Entity::default()
        };
        let context = SymbolContext {
            parent_name: Some("CoPI"),
            ..SymbolContext::default()
        };
        let symbol = SymbolShape::from_entity(&entity, context, &projection).unwrap();
        assert_eq!(symbol.label, "CoPI, Commandopost\n\nWest");
        assert_eq!(symbol.background.color, "#0080ff");
        assert!((symbol.background.transparency - 1.0).abs() < 1e-12);
        assert!(symbol.origin.is_none());

        let plain = SymbolShape::from_entity(&Entity::default(), context, &projection).unwrap();
        assert_eq!(plain.label, "CoPI");
        assert_eq!(plain.background, Background::default());
    }
}
