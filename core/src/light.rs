//! Light description shared with the pixel shader.

use glam::Vec3;

/// Maximum number of lights in a pixel constant block.
pub const MAX_LIGHTS: usize = 32;

/// Kind of light, stored as the first `int` of [`Light`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum LightType {
    Directional = 0,
    Point = 1,
    Spot = 2,
}

impl TryFrom<i32> for LightType {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Directional),
            1 => Ok(Self::Point),
            2 => Ok(Self::Spot),
            other => Err(other),
        }
    }
}

/// One light, laid out exactly as the HLSL `Light` struct.
///
/// Each `float3` is followed by a scalar so that the pair fills one 16-byte
/// register; the struct is 64 bytes and lights are packed at that stride.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Light {
    pub kind: i32,
    pub direction: [f32; 3],
    pub range: f32,
    pub position: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 3],
    pub spot_falloff: f32,
    pub _padding: [f32; 3],
}

static_assertions::const_assert_eq!(std::mem::size_of::<Light>(), 64);

impl Default for Light {
    fn default() -> Self {
        Self::directional(Vec3::NEG_Y, Vec3::ONE, 1.0)
    }
}

impl Light {
    /// A light shining uniformly along `direction`.
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightType::Directional as i32,
            direction: direction.normalize_or_zero().to_array(),
            range: 0.0,
            position: [0.0; 3],
            intensity,
            color: color.to_array(),
            spot_falloff: 0.0,
            _padding: [0.0; 3],
        }
    }

    /// A light radiating from `position` with attenuation over `range`.
    pub fn point(position: Vec3, range: f32, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightType::Point as i32,
            direction: [0.0; 3],
            range,
            position: position.to_array(),
            intensity,
            color: color.to_array(),
            spot_falloff: 0.0,
            _padding: [0.0; 3],
        }
    }

    /// A cone light at `position` pointing along `direction`.
    pub fn spot(
        position: Vec3,
        direction: Vec3,
        range: f32,
        spot_falloff: f32,
        color: Vec3,
        intensity: f32,
    ) -> Self {
        Self {
            kind: LightType::Spot as i32,
            direction: direction.normalize_or_zero().to_array(),
            range,
            position: position.to_array(),
            intensity,
            color: color.to_array(),
            spot_falloff,
            _padding: [0.0; 3],
        }
    }

    /// Decoded light kind, or the raw value if it is not a known kind.
    pub fn light_type(&self) -> Result<LightType, i32> {
        LightType::try_from(self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_offsets() {
        assert_eq!(std::mem::offset_of!(Light, direction), 4);
        assert_eq!(std::mem::offset_of!(Light, range), 16);
        assert_eq!(std::mem::offset_of!(Light, position), 20);
        assert_eq!(std::mem::offset_of!(Light, intensity), 32);
        assert_eq!(std::mem::offset_of!(Light, color), 36);
        assert_eq!(std::mem::offset_of!(Light, spot_falloff), 48);
    }

    #[test]
    fn test_constructors() {
        let dir = Light::directional(Vec3::new(0.0, -2.0, 0.0), Vec3::ONE, 1.0);
        assert_eq!(dir.light_type(), Ok(LightType::Directional));
        assert_eq!(dir.direction, [0.0, -1.0, 0.0]);

        let point = Light::point(Vec3::X, 5.0, Vec3::ONE, 2.0);
        assert_eq!(point.light_type(), Ok(LightType::Point));
        assert_eq!(point.range, 5.0);

        let raw = Light { kind: 9, ..point };
        assert_eq!(raw.light_type(), Err(9));
    }
}
