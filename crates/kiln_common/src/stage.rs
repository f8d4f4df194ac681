//! Shader stages and stage masks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One shader unit in a pipeline.
///
/// The discriminants double as bit positions in a [`StageMask`] and as
/// indices into per-stage tables.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[repr(u32)]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex = 0,
    /// Tessellation control shader.
    TessControl = 1,
    /// Tessellation evaluation shader.
    TessEval = 2,
    /// Geometry shader.
    Geometry = 3,
    /// Fragment shader.
    Fragment = 4,
    /// Compute shader.
    Compute = 5,
}

impl ShaderStage {
    /// Number of stages, including compute.
    pub const COUNT: usize = 6;

    /// Number of graphics stages (vertex through fragment).
    pub const GFX_COUNT: usize = 5;

    /// All stages in pipeline order.
    pub const ALL: [ShaderStage; Self::COUNT] = [
        ShaderStage::Vertex,
        ShaderStage::TessControl,
        ShaderStage::TessEval,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
        ShaderStage::Compute,
    ];

    /// Graphics stages in pipeline order.
    pub const GRAPHICS: [ShaderStage; Self::GFX_COUNT] = [
        ShaderStage::Vertex,
        ShaderStage::TessControl,
        ShaderStage::TessEval,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
    ];

    /// Returns the table index of this stage.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Returns the stage for a table index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Returns the single-bit mask of this stage.
    pub fn mask(self) -> StageMask {
        StageMask(1 << self as u32)
    }

    /// Short abbreviation used in hash reports.
    pub fn abbreviation(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "VS",
            ShaderStage::TessControl => "TCS",
            ShaderStage::TessEval => "TES",
            ShaderStage::Geometry => "GS",
            ShaderStage::Fragment => "FS",
            ShaderStage::Compute => "CS",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::TessControl => "tessellation control",
            ShaderStage::TessEval => "tessellation evaluation",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        };
        f.write_str(name)
    }
}

/// A set of shader stages.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StageMask(u32);

impl StageMask {
    /// The empty mask.
    pub const EMPTY: StageMask = StageMask(0);

    /// Wraps raw bits.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if `stage` is in the mask.
    pub fn contains(self, stage: ShaderStage) -> bool {
        self.0 & stage.mask().0 != 0
    }

    /// Adds a stage.
    pub fn insert(&mut self, stage: ShaderStage) {
        self.0 |= stage.mask().0;
    }

    /// Removes a stage.
    pub fn remove(&mut self, stage: ShaderStage) {
        self.0 &= !stage.mask().0;
    }

    /// Returns `true` if no stage is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the mask restricted to the fragment stage.
    pub fn fragment_part(self) -> StageMask {
        StageMask(self.0 & ShaderStage::Fragment.mask().0)
    }

    /// Returns the mask with the fragment stage removed.
    pub fn non_fragment_part(self) -> StageMask {
        StageMask(self.0 & !ShaderStage::Fragment.mask().0)
    }

    /// Iterates over the stages in pipeline order.
    pub fn iter(self) -> impl Iterator<Item = ShaderStage> {
        ShaderStage::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl FromIterator<ShaderStage> for StageMask {
    fn from_iter<I: IntoIterator<Item = ShaderStage>>(iter: I) -> Self {
        let mut mask = StageMask::EMPTY;
        for stage in iter {
            mask.insert(stage);
        }
        mask
    }
}

impl std::ops::BitOr for StageMask {
    type Output = StageMask;

    fn bitor(self, rhs: StageMask) -> StageMask {
        StageMask(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for StageMask {
    fn bitor_assign(&mut self, rhs: StageMask) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for StageMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.iter().map(|s| s.abbreviation()).collect();
        write!(f, "StageMask[{}]", names.join("|"))
    }
}
