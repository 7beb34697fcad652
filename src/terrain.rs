// src/terrain.rs
//! Region terrain: a regular heightmap plus the water level.
//!
//! Samples are stored row-major, row index along +Y, column index along +X,
//! spanning the whole region inclusive of both edges.

use glam::Vec3;

use crate::error::{PhysicsError, PhysicsResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Terrain {
    size_x: f32,
    size_y: f32,
    columns: usize,
    rows: usize,
    heights: Vec<f32>,
    water_height: f32,
}

impl Terrain {
    /// Flat terrain over `size` at `height`.
    pub fn flat(size: [f32; 2], height: f32, water_height: f32) -> Self {
        Self {
            size_x: size[0],
            size_y: size[1],
            columns: 2,
            rows: 2,
            heights: vec![height; 4],
            water_height,
        }
    }

    pub fn from_heights(
        size: [f32; 2],
        columns: usize,
        rows: usize,
        heights: Vec<f32>,
        water_height: f32,
    ) -> PhysicsResult<Self> {
        if columns < 2 || rows < 2 {
            return Err(PhysicsError::InvalidParameter(format!(
                "heightmap needs at least 2x2 samples, got {columns}x{rows}"
            )));
        }
        if heights.len() != columns * rows {
            return Err(PhysicsError::InvalidParameter(format!(
                "heightmap has {} samples, expected {}",
                heights.len(),
                columns * rows
            )));
        }
        if heights.iter().any(|h| !h.is_finite()) || !water_height.is_finite() {
            return Err(PhysicsError::InvalidParameter("heightmap contains non-finite samples".into()));
        }
        Ok(Self {
            size_x: size[0],
            size_y: size[1],
            columns,
            rows,
            heights,
            water_height,
        })
    }

    #[inline]
    pub fn size(&self) -> [f32; 2] {
        [self.size_x, self.size_y]
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.columns
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn sample(&self, column: usize, row: usize) -> f32 {
        self.heights[row * self.columns + column]
    }

    #[inline]
    pub fn water_height(&self) -> f32 {
        self.water_height
    }

    pub fn set_water_height(&mut self, height: f32) {
        self.water_height = height;
    }

    pub fn center(&self) -> Vec3 {
        let x = self.size_x * 0.5;
        let y = self.size_y * 0.5;
        Vec3::new(x, y, self.height_at(x, y))
    }

    pub fn is_within_bounds(&self, pos: Vec3) -> bool {
        pos.x >= 0.0 && pos.y >= 0.0 && pos.x <= self.size_x && pos.y <= self.size_y
    }

    /// Clamp x/y into the region, leaving z alone.
    pub fn clamp_to_bounds(&self, pos: Vec3) -> Vec3 {
        Vec3::new(pos.x.clamp(0.0, self.size_x), pos.y.clamp(0.0, self.size_y), pos.z)
    }

    /// Bilinear height at (x, y); positions outside the region use the edge.
    pub fn height_at(&self, x: f32, y: f32) -> f32 {
        let cell_x = self.size_x / (self.columns - 1) as f32;
        let cell_y = self.size_y / (self.rows - 1) as f32;
        let fx = (x.clamp(0.0, self.size_x) / cell_x).min((self.columns - 1) as f32);
        let fy = (y.clamp(0.0, self.size_y) / cell_y).min((self.rows - 1) as f32);

        let c0 = (fx.floor() as usize).min(self.columns - 2);
        let r0 = (fy.floor() as usize).min(self.rows - 2);
        let tx = fx - c0 as f32;
        let ty = fy - r0 as f32;

        let h00 = self.sample(c0, r0);
        let h10 = self.sample(c0 + 1, r0);
        let h01 = self.sample(c0, r0 + 1);
        let h11 = self.sample(c0 + 1, r0 + 1);
        let bottom = h00 + (h10 - h00) * tx;
        let top = h01 + (h11 - h01) * tx;
        bottom + (top - bottom) * ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_terrain_is_flat_everywhere() {
        let terrain = Terrain::flat([256.0, 256.0], 21.0, 20.0);
        assert_eq!(terrain.height_at(0.0, 0.0), 21.0);
        assert_eq!(terrain.height_at(128.5, 17.25), 21.0);
        assert_eq!(terrain.height_at(-50.0, 900.0), 21.0);
    }

    #[test]
    fn height_is_bilinear_between_samples() {
        // 3x2 samples over 20x10: x = 0, 10, 20; y = 0, 10
        let terrain =
            Terrain::from_heights([20.0, 10.0], 3, 2, vec![0.0, 10.0, 20.0, 0.0, 10.0, 20.0], 0.0).unwrap();
        assert!((terrain.height_at(5.0, 5.0) - 5.0).abs() < 1e-5);
        assert!((terrain.height_at(15.0, 0.0) - 15.0).abs() < 1e-5);
        assert!((terrain.height_at(20.0, 10.0) - 20.0).abs() < 1e-5);
    }

    #[test]
    fn bounds_and_clamping() {
        let terrain = Terrain::flat([256.0, 256.0], 0.0, 0.0);
        assert!(terrain.is_within_bounds(Vec3::new(10.0, 10.0, -5.0)));
        assert!(!terrain.is_within_bounds(Vec3::new(-1.0, 10.0, 0.0)));
        assert_eq!(terrain.clamp_to_bounds(Vec3::new(300.0, -4.0, 7.0)), Vec3::new(256.0, 0.0, 7.0));
    }

    #[test]
    fn malformed_heightmaps_are_rejected() {
        assert!(Terrain::from_heights([10.0, 10.0], 2, 2, vec![0.0; 3], 0.0).is_err());
        assert!(Terrain::from_heights([10.0, 10.0], 1, 4, vec![0.0; 4], 0.0).is_err());
        assert!(Terrain::from_heights([10.0, 10.0], 2, 2, vec![0.0, f32::NAN, 0.0, 0.0], 0.0).is_err());
    }
}
