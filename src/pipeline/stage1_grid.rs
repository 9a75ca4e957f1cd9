use crate::input::SlideDimensions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    /// Row-major position in the grid; stable across dispatch order.
    pub index: usize,
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct GridParams {
    pub patch_size: u32,
    pub stride: u32,
    pub max_patches: usize,
}

// Origins run 0, T, 2T, ... while origin < extent - S, so the last partial
// row and column are dropped rather than clamped. The cap truncates the
// row-major enumeration.
pub fn run_stage1(dims: SlideDimensions, params: &GridParams) -> Vec<Patch> {
    let mut out = Vec::new();
    if params.stride == 0 || params.max_patches == 0 {
        return out;
    }
    let (Some(x_limit), Some(y_limit)) = (
        dims.width.checked_sub(params.patch_size),
        dims.height.checked_sub(params.patch_size),
    ) else {
        return out;
    };

    'rows: for y in (0..y_limit).step_by(params.stride as usize) {
        for x in (0..x_limit).step_by(params.stride as usize) {
            out.push(Patch {
                index: out.len(),
                x,
                y,
                size: params.patch_size,
            });
            if out.len() >= params.max_patches {
                break 'rows;
            }
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage1_grid.rs"]
mod tests;
