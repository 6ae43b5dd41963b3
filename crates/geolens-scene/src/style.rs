//! Type-tag driven visual style for primitive placeholders.

/// Primitive shapes a backend can build without any asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveShape {
    Cube,
    Sphere,
    Cone,
    Octahedron,
}

impl PrimitiveShape {
    /// Triangle count of the default tessellation.
    pub fn triangles(self) -> u64 {
        match self {
            PrimitiveShape::Cube => 12,
            // 32 × 16 segments
            PrimitiveShape::Sphere => 960,
            PrimitiveShape::Cone => 64,
            PrimitiveShape::Octahedron => 8,
        }
    }
}

/// Look of a placeholder object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualStyle {
    pub shape: PrimitiveShape,
    /// 0xRRGGBB
    pub color: u32,
    pub base_scale: f64,
}

impl VisualStyle {
    /// Style for an agent's `type_tag`.  Matching is case-insensitive;
    /// unknown tags get a neutral octahedron.
    pub fn for_type_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "finance" | "payment" | "bank" => Self {
                shape: PrimitiveShape::Cube,
                color: 0x2e_c4_6b,
                base_scale: 1.0,
            },
            "guide" | "tour" | "info" => Self {
                shape: PrimitiveShape::Sphere,
                color: 0x3b_82_f6,
                base_scale: 0.8,
            },
            "game" | "quest" => Self {
                shape: PrimitiveShape::Cone,
                color: 0xf5_9e_0b,
                base_scale: 1.2,
            },
            _ => Self {
                shape: PrimitiveShape::Octahedron,
                color: 0xa8_55_f7,
                base_scale: 1.0,
            },
        }
    }
}
