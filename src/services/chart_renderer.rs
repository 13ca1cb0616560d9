//! 图表渲染服务 - 业务能力层
//!
//! 把表格中的数值列画成柱状图、折线图或散点图，输出 PNG 字节

use std::io::Cursor;

use image::{ImageBuffer, Rgb, RgbImage};

use crate::error::ChartError;
use crate::models::page::cell_as_f64;
use crate::models::{ChartKind, ChartRequest, TabularData};

/// 图表渲染能力
pub trait ChartRenderer: Send + Sync {
    fn render(&self, data: &TabularData, request: &ChartRequest) -> Result<Vec<u8>, ChartError>;
}

/// 按请求中的 `source` 选择数据表，缺省取第一张
pub fn select_table<'a>(
    tables: &'a [TabularData],
    request: &ChartRequest,
) -> Result<&'a TabularData, ChartError> {
    match &request.source {
        Some(source) => tables
            .iter()
            .find(|t| &t.source == source)
            .or_else(|| tables.first())
            .ok_or(ChartError::NoData),
        None => tables.first().ok_or(ChartError::NoData),
    }
}

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const BAR: Rgb<u8> = Rgb([66, 133, 244]);
const NEGATIVE_BAR: Rgb<u8> = Rgb([219, 68, 55]);
const MARK: Rgb<u8> = Rgb([15, 157, 88]);

/// 数据坐标到像素坐标的映射
struct Frame {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    x_range: (f64, f64),
    y_range: (f64, f64),
}

impl Frame {
    fn to_pixel(&self, x: f64, y: f64) -> (i64, i64) {
        let fraction = |v: f64, (lo, hi): (f64, f64)| {
            if hi - lo > f64::EPSILON {
                (v - lo) / (hi - lo)
            } else {
                0.5
            }
        };
        let px = self.left + fraction(x, self.x_range) * self.width;
        let py = self.top + (1.0 - fraction(y, self.y_range)) * self.height;
        (px.round() as i64, py.round() as i64)
    }
}

fn range_of(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

/// 柱状图 / 折线图 / 散点图渲染器
#[derive(Debug, Clone)]
pub struct PlotRenderer {
    width: u32,
    height: u32,
    margin: u32,
}

impl Default for PlotRenderer {
    fn default() -> Self {
        Self {
            width: 800,
            height: 480,
            margin: 40,
        }
    }
}

impl PlotRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    fn canvas(&self) -> RgbImage {
        ImageBuffer::from_pixel(self.width, self.height, BACKGROUND)
    }

    fn plot_size(&self) -> (u32, u32) {
        (
            self.width.saturating_sub(2 * self.margin).max(1),
            self.height.saturating_sub(2 * self.margin).max(1),
        )
    }

    fn frame(&self, x_range: (f64, f64), y_range: (f64, f64)) -> Frame {
        let (plot_w, plot_h) = self.plot_size();
        Frame {
            left: self.margin as f64,
            top: self.margin as f64,
            width: plot_w as f64,
            height: plot_h as f64,
            x_range,
            y_range,
        }
    }

    fn fill_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
        for py in y..(y + h).min(img.height()) {
            for px in x..(x + w).min(img.width()) {
                img.put_pixel(px, py, color);
            }
        }
    }

    fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
            img.put_pixel(x as u32, y as u32, color);
        }
    }

    fn mark(img: &mut RgbImage, (x, y): (i64, i64), radius: i64, color: Rgb<u8>) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                Self::put(img, x + dx, y + dy, color);
            }
        }
    }

    /// Bresenham 直线，线宽 2 像素
    fn segment(img: &mut RgbImage, (x0, y0): (i64, i64), (x1, y1): (i64, i64), color: Rgb<u8>) {
        let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
        let (sx, sy) = (if x0 < x1 { 1 } else { -1 }, if y0 < y1 { 1 } else { -1 });
        let (mut x, mut y, mut err) = (x0, y0, dx + dy);
        loop {
            Self::put(img, x, y, color);
            Self::put(img, x, y + 1, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn axes(&self, img: &mut RgbImage, baseline: u32) {
        let (plot_w, plot_h) = self.plot_size();
        Self::fill_rect(img, self.margin, self.margin, 2, plot_h, AXIS);
        Self::fill_rect(img, self.margin, baseline, plot_w, 2, AXIS);
    }

    fn draw_bars(&self, values: &[f64]) -> RgbImage {
        let mut img = self.canvas();
        let (plot_w, plot_h) = self.plot_size();

        let max = values.iter().cloned().fold(0.0_f64, f64::max);
        let min = values.iter().cloned().fold(0.0_f64, f64::min);
        let span = (max - min).max(f64::EPSILON);
        // 零线位置（自顶向下的像素偏移）
        let zero_y = self.margin + ((max / span) * plot_h as f64).round() as u32;

        let slot = (plot_w / values.len().max(1) as u32).max(1);
        let bar_w = (slot * 7 / 10).max(1);
        for (i, value) in values.iter().enumerate() {
            let x = self.margin + i as u32 * slot + (slot - bar_w) / 2;
            let h = ((value.abs() / span) * plot_h as f64).round() as u32;
            if *value >= 0.0 {
                Self::fill_rect(&mut img, x, zero_y.saturating_sub(h), bar_w, h, BAR);
            } else {
                Self::fill_rect(&mut img, x, zero_y, bar_w, h, NEGATIVE_BAR);
            }
        }

        self.axes(&mut img, zero_y);
        img
    }

    fn draw_line(&self, values: &[f64]) -> RgbImage {
        let mut img = self.canvas();
        let last = values.len().saturating_sub(1) as f64;
        let frame = self.frame((0.0, last), range_of(values.iter().cloned()));

        let points: Vec<(i64, i64)> = values
            .iter()
            .enumerate()
            .map(|(i, v)| frame.to_pixel(i as f64, *v))
            .collect();
        for pair in points.windows(2) {
            Self::segment(&mut img, pair[0], pair[1], BAR);
        }
        for point in &points {
            Self::mark(&mut img, *point, 2, BAR);
        }

        self.axes(&mut img, self.margin + self.plot_size().1);
        img
    }

    fn draw_scatter(&self, points: &[(f64, f64)]) -> RgbImage {
        let mut img = self.canvas();
        let frame = self.frame(
            range_of(points.iter().map(|p| p.0)),
            range_of(points.iter().map(|p| p.1)),
        );
        for (x, y) in points {
            Self::mark(&mut img, frame.to_pixel(*x, *y), 3, MARK);
        }

        self.axes(&mut img, self.margin + self.plot_size().1);
        img
    }
}

/// y 列的数值，非数值单元格按 0 处理
fn column_values(data: &TabularData, y_index: usize) -> Vec<f64> {
    data.rows
        .iter()
        .map(|row| row.get(y_index).and_then(cell_as_f64).unwrap_or(0.0))
        .collect()
}

/// 散点坐标：x 列没有数值时使用行号
fn scatter_points(data: &TabularData, x_index: usize, y_index: usize) -> Vec<(f64, f64)> {
    let xs = data.numeric_column(x_index);
    let x_numeric = xs.iter().any(Option::is_some);
    data.numeric_column(y_index)
        .into_iter()
        .enumerate()
        .filter_map(|(i, y)| {
            let x = if x_numeric { xs[i]? } else { i as f64 };
            Some((x, y?))
        })
        .collect()
}

impl ChartRenderer for PlotRenderer {
    fn render(&self, data: &TabularData, request: &ChartRequest) -> Result<Vec<u8>, ChartError> {
        let x_index = data
            .column_index(&request.x_column)
            .ok_or_else(|| ChartError::MissingColumn(request.x_column.clone()))?;
        let y_index = data
            .column_index(&request.y_column)
            .ok_or_else(|| ChartError::MissingColumn(request.y_column.clone()))?;
        if data.numeric_column(y_index).iter().all(Option::is_none) {
            return Err(ChartError::NoNumericValues(request.y_column.clone()));
        }

        let img = match request.kind {
            ChartKind::Bar => self.draw_bars(&column_values(data, y_index)),
            ChartKind::Line => self.draw_line(&column_values(data, y_index)),
            ChartKind::Scatter => {
                let points = scatter_points(data, x_index, y_index);
                if points.is_empty() {
                    return Err(ChartError::NoNumericValues(request.x_column.clone()));
                }
                self.draw_scatter(&points)
            }
        };

        let mut bytes: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|e| ChartError::Encode(e.to_string()))?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> TabularData {
        TabularData {
            source: "sales.csv".to_string(),
            columns: vec!["city".to_string(), "amount".to_string()],
            rows: vec![
                vec![json!("a"), json!(10)],
                vec![json!("b"), json!(-4)],
                vec![json!("c"), json!("7")],
            ],
        }
    }

    fn request(y: &str) -> ChartRequest {
        ChartRequest {
            kind: ChartKind::Bar,
            x_column: "city".to_string(),
            y_column: y.to_string(),
            title: None,
            source: None,
        }
    }

    fn decode(bytes: &[u8]) -> RgbImage {
        image::load_from_memory(bytes).unwrap().to_rgb8()
    }

    fn count(img: &RgbImage, color: Rgb<u8>) -> usize {
        img.pixels().filter(|p| **p == color).count()
    }

    #[test]
    fn renders_png_bytes() {
        let bytes = PlotRenderer::new(200, 120)
            .render(&table(), &request("amount"))
            .unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let img = decode(&bytes);
        assert_eq!(img.width(), 200);
        assert!(count(&img, NEGATIVE_BAR) > 0);
    }

    #[test]
    fn line_chart_connects_points() {
        let mut req = request("amount");
        req.kind = ChartKind::Line;
        let img = decode(&PlotRenderer::new(200, 120).render(&table(), &req).unwrap());

        // 折线不区分正负
        assert!(count(&img, BAR) > 0);
        assert_eq!(count(&img, NEGATIVE_BAR), 0);
        assert_eq!(count(&img, MARK), 0);
    }

    #[test]
    fn scatter_uses_numeric_x_column() {
        let data = TabularData {
            source: "xy.csv".to_string(),
            columns: vec!["x".to_string(), "y".to_string()],
            rows: vec![
                vec![json!(1.5), json!(2)],
                vec![json!(3), json!(8)],
                vec![json!("n/a"), json!(5)],
            ],
        };
        assert_eq!(scatter_points(&data, 0, 1), vec![(1.5, 2.0), (3.0, 8.0)]);

        let req = ChartRequest {
            kind: ChartKind::Scatter,
            x_column: "x".to_string(),
            y_column: "y".to_string(),
            title: None,
            source: None,
        };
        let img = decode(&PlotRenderer::new(200, 120).render(&data, &req).unwrap());
        assert!(count(&img, MARK) > 0);
        assert_eq!(count(&img, BAR), 0);
    }

    #[test]
    fn scatter_falls_back_to_row_order() {
        assert_eq!(
            scatter_points(&table(), 0, 1),
            vec![(0.0, 10.0), (1.0, -4.0), (2.0, 7.0)]
        );
    }

    #[test]
    fn missing_or_text_columns_fail() {
        let renderer = PlotRenderer::default();
        assert!(matches!(
            renderer.render(&table(), &request("profit")),
            Err(ChartError::MissingColumn(_))
        ));
        assert!(matches!(
            renderer.render(&table(), &request("city")),
            Err(ChartError::NoNumericValues(_))
        ));
    }

    #[test]
    fn select_table_prefers_named_source() {
        let mut other = table();
        other.source = "other.csv".to_string();
        let tables = vec![table(), other];
        let mut req = request("amount");
        req.source = Some("other.csv".to_string());
        assert_eq!(select_table(&tables, &req).unwrap().source, "other.csv");
        assert!(matches!(select_table(&[], &req), Err(ChartError::NoData)));
    }
}
