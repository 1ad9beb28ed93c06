use macroquad::prelude::*;

use crate::config;

/// Toroidal arena bounds. Every position lives in `[0, width) x [0, height)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct World {
    pub width: f32,
    pub height: f32,
}

impl World {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Vec2 {
        vec2(self.width * 0.5, self.height * 0.5)
    }

    /// Length of the arena diagonal, used to scale relative displacements.
    pub fn diagonal(&self) -> f32 {
        self.width.hypot(self.height)
    }

    /// Wrap position into world bounds.
    pub fn wrap(&self, pos: Vec2) -> Vec2 {
        vec2(wrap_axis(pos.x, self.width), wrap_axis(pos.y, self.height))
    }

    /// Apply a movement delta and wrap the result.
    pub fn offset(&self, pos: Vec2, delta: Vec2) -> Vec2 {
        self.wrap(pos + delta)
    }

    /// Raw displacement from `from` to `to`, ignoring the wrap seam.
    pub fn delta(&self, from: Vec2, to: Vec2) -> Vec2 {
        to - from
    }

    pub fn distance(&self, a: Vec2, b: Vec2) -> f32 {
        self.delta(a, b).length()
    }

    pub fn random_position(&self, rng: &mut impl ::rand::Rng) -> Vec2 {
        vec2(rng.gen_range(0.0..self.width), rng.gen_range(0.0..self.height))
    }
}

// `rem_euclid` can round up to exactly `extent` for tiny negative inputs.
fn wrap_axis(value: f32, extent: f32) -> f32 {
    let wrapped = value.rem_euclid(extent);
    if wrapped >= extent {
        0.0
    } else {
        wrapped
    }
}

/// Scale `v` to unit length, dividing by `|v| + eps` so a zero vector stays zero.
pub fn normalize_or_zero(v: Vec2) -> Vec2 {
    v / (v.length() + config::NORM_EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_keeps_coordinates_in_half_open_bounds() {
        let world = World::new(600.0, 400.0);
        let cases = [
            vec2(-1.0, -1.0),
            vec2(600.0, 400.0),
            vec2(1201.5, -801.0),
            vec2(-1e-9, -1e-9),
            vec2(599.999, 0.0),
        ];
        for pos in cases {
            let w = world.wrap(pos);
            assert!((0.0..600.0).contains(&w.x), "x out of bounds for {pos:?}: {w:?}");
            assert!((0.0..400.0).contains(&w.y), "y out of bounds for {pos:?}: {w:?}");
        }
        assert_eq!(world.wrap(vec2(-1.0, 401.0)), vec2(599.0, 1.0));
    }

    #[test]
    fn normalize_or_zero_is_safe_on_zero_vector() {
        assert_eq!(normalize_or_zero(Vec2::ZERO), Vec2::ZERO);
        let unit = normalize_or_zero(vec2(3.0, 4.0));
        assert!((unit.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn diagonal_matches_pythagoras() {
        let world = World::new(300.0, 400.0);
        assert!((world.diagonal() - 500.0).abs() < 1e-3);
    }
}
