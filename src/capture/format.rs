//! Feed format types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolution (width x height) of a source frame, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both dimensions are non-zero
    ///
    /// A feed reports 0x0 until its metadata is available.
    pub fn is_known(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub const VGA: Resolution = Resolution {
        width: 640,
        height: 480,
    };
    pub const HD720: Resolution = Resolution {
        width: 1280,
        height: 720,
    };
    pub const HD1080: Resolution = Resolution {
        width: 1920,
        height: 1080,
    };
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(|c: char| c == 'x' || c == 'X')
            .ok_or_else(|| format!("Invalid resolution: {}", s))?;
        let width = w
            .trim()
            .parse()
            .map_err(|_| format!("Invalid resolution width: {}", w))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| format!("Invalid resolution height: {}", h))?;
        Ok(Self { width, height })
    }
}
