use std::fmt;

/// The geometric target a vote or proposal branch predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// The object center.
    Center,
    /// The centers of the upper and lower box faces.
    ZFace,
    /// The centers of the left, right, front and back box faces.
    XyFace,
    /// The centers of the box edges.
    Edge,
}

impl PrimitiveType {
    /// All primitive types, center first.
    pub const ALL: [PrimitiveType; 4] = [
        PrimitiveType::Center,
        PrimitiveType::ZFace,
        PrimitiveType::XyFace,
        PrimitiveType::Edge,
    ];

    /// The boundary primitives aggregated by the primitive proposal modules.
    pub const BOUNDARY: [PrimitiveType; 3] = [
        PrimitiveType::ZFace,
        PrimitiveType::XyFace,
        PrimitiveType::Edge,
    ];

    /// Number of box size residual channels predicted for the primitive.
    ///
    /// A z-face constrains both horizontal extents, an xy-face one extent, an edge none.
    pub fn size_residual_dim(&self) -> usize {
        match self {
            PrimitiveType::ZFace => 2,
            PrimitiveType::XyFace => 1,
            PrimitiveType::Center | PrimitiveType::Edge => 0,
        }
    }

    /// Position of the primitive in [`PrimitiveType::ALL`].
    pub fn index(&self) -> usize {
        match self {
            PrimitiveType::Center => 0,
            PrimitiveType::ZFace => 1,
            PrimitiveType::XyFace => 2,
            PrimitiveType::Edge => 3,
        }
    }

    /// Short name, also used as variable prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::Center => "center",
            PrimitiveType::ZFace => "z",
            PrimitiveType::XyFace => "xy",
            PrimitiveType::Edge => "line",
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the six bounding planes of an oriented box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plane {
    /// Top face.
    Upper,
    /// Bottom face.
    Lower,
    /// Left face.
    Left,
    /// Right face.
    Right,
    /// Front face.
    Front,
    /// Back face.
    Back,
}

impl Plane {
    /// The six planes in storage order.
    pub const ALL: [Plane; 6] = [
        Plane::Upper,
        Plane::Lower,
        Plane::Left,
        Plane::Right,
        Plane::Front,
        Plane::Back,
    ];

    /// Opposite-face pairs.
    pub const PAIRS: [(Plane, Plane); 3] = [
        (Plane::Upper, Plane::Lower),
        (Plane::Left, Plane::Right),
        (Plane::Front, Plane::Back),
    ];

    /// Position of the plane in [`Plane::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Plane::Upper => 0,
            Plane::Lower => 1,
            Plane::Left => 2,
            Plane::Right => 3,
            Plane::Front => 4,
            Plane::Back => 5,
        }
    }

    /// Short name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Plane::Upper => "upper",
            Plane::Lower => "lower",
            Plane::Left => "left",
            Plane::Right => "right",
            Plane::Front => "front",
            Plane::Back => "back",
        }
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
