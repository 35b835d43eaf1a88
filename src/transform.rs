//! Per-pixel colour quantisation followed by the copy-plan scatter.

use std::sync::Arc;

use rayon::prelude::*;

use crate::color_table::{table_offset, ColorTable};
use crate::copy_plan::CopyPlan;
use crate::error::{PipelineError, Result};
use crate::media::YuvPlanes;

#[derive(Debug, Clone)]
pub struct FrameTransformer {
    table: Arc<ColorTable>,
    plan: Arc<CopyPlan>,
    width: usize,
    height: usize,
}

impl FrameTransformer {
    pub fn new(
        table: Arc<ColorTable>,
        plan: Arc<CopyPlan>,
        width: usize,
        height: usize,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidCopyPlan(format!(
                "frame size {}x{} is empty",
                width, height
            )));
        }
        let area = width * height;
        if plan.src_len() != area {
            return Err(PipelineError::InvalidCopyPlan(format!(
                "plan reads {} bytes, frame has {}",
                plan.src_len(),
                area
            )));
        }
        Ok(Self {
            table,
            plan,
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Size of the buffer produced for each frame.
    pub fn output_len(&self) -> usize {
        self.plan.dst_len()
    }

    pub fn plan(&self) -> &CopyPlan {
        &self.plan
    }

    pub fn transform(&self, planes: YuvPlanes<'_>) -> Result<Vec<u8>> {
        let mut out = alloc(self.output_len(), "frame output")?;
        self.transform_into(planes, &mut out)?;
        Ok(out)
    }

    pub fn transform_into(&self, planes: YuvPlanes<'_>, out: &mut [u8]) -> Result<()> {
        let area = self.width * self.height;
        for (name, plane) in [("Y", planes.y), ("Cb", planes.cb), ("Cr", planes.cr)] {
            if plane.len() != area {
                return Err(PipelineError::Transform(format!(
                    "{} plane has {} bytes, expected {}",
                    name,
                    plane.len(),
                    area
                )));
            }
        }
        if out.len() != self.output_len() {
            return Err(PipelineError::Transform(format!(
                "output buffer has {} bytes, expected {}",
                out.len(),
                self.output_len()
            )));
        }

        let mut linear = alloc(area, "linear palette buffer")?;
        let table = self.table.as_bytes();
        let row = self.width;

        linear
            .par_chunks_mut(row)
            .zip(planes.y.par_chunks(row))
            .zip(planes.cb.par_chunks(row))
            .zip(planes.cr.par_chunks(row))
            .for_each(|(((dst, y), cb), cr)| {
                for (((d, y), cb), cr) in dst.iter_mut().zip(y).zip(cb).zip(cr) {
                    *d = table[table_offset(*y, *cb, *cr)];
                }
            });

        self.plan.apply(&linear, out)
    }
}

fn alloc(len: usize, what: &'static str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| PipelineError::Allocation { what, bytes: len })?;
    buf.resize(len, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    static XOR_TABLE: LazyLock<Arc<ColorTable>> = LazyLock::new(|| {
        Arc::new(ColorTable::from_fn(|y, cb, cr| (y.wrapping_mul(3) ^ cb ^ cr.rotate_left(1)) as i8).unwrap())
    });

    fn planes(len: usize, seed: u8) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let y = (0..len).map(|i| (i as u8).wrapping_mul(seed)).collect();
        let cb = (0..len).map(|i| (i as u8).wrapping_add(seed)).collect();
        let cr = (0..len).map(|i| (i as u8) ^ seed).collect();
        (y, cb, cr)
    }

    fn as_planes<'a>(p: &'a (Vec<u8>, Vec<u8>, Vec<u8>)) -> YuvPlanes<'a> {
        YuvPlanes {
            y: &p.0,
            cb: &p.1,
            cr: &p.2,
        }
    }

    #[test]
    fn test_each_pixel_uses_its_own_table_entry() {
        let (w, h) = (6, 4);
        let plan = Arc::new(CopyPlan::identity(w, h).unwrap());
        let t = FrameTransformer::new(XOR_TABLE.clone(), plan, w, h).unwrap();
        let p = planes(w * h, 13);
        let out = t.transform(as_planes(&p)).unwrap();
        for i in 0..w * h {
            assert_eq!(out[i] as i8, XOR_TABLE.lookup(p.0[i], p.1[i], p.2[i]));
        }
    }

    #[test]
    fn test_deterministic_for_identical_input() {
        let (w, h) = (16, 10);
        let plan = Arc::new(CopyPlan::tiled(w, h, 4).unwrap());
        let t = FrameTransformer::new(XOR_TABLE.clone(), plan, w, h).unwrap();
        let a = planes(w * h, 5);
        let b = a.clone();
        assert_eq!(t.transform(as_planes(&a)).unwrap(), t.transform(as_planes(&b)).unwrap());
    }

    #[test]
    fn test_zero_planes_broadcast_entry_zero() {
        let (w, h) = (8, 8);
        let table = Arc::new(ColorTable::from_fn(|y, cb, cr| if (y, cb, cr) == (0, 0, 0) { -42 } else { 1 }).unwrap());
        let plan = Arc::new(CopyPlan::tiled(w, h, 4).unwrap());
        let t = FrameTransformer::new(table, plan, w, h).unwrap();
        let zeros = (vec![0; w * h], vec![0; w * h], vec![0; w * h]);
        let out = t.transform(as_planes(&zeros)).unwrap();
        assert!(out.iter().all(|b| *b as i8 == -42));
    }

    #[test]
    fn test_scatter_matches_plan() {
        let (w, h) = (8, 4);
        let identity = FrameTransformer::new(
            XOR_TABLE.clone(),
            Arc::new(CopyPlan::identity(w, h).unwrap()),
            w,
            h,
        )
        .unwrap();
        let plan = Arc::new(CopyPlan::tiled(w, h, 4).unwrap());
        let tiled = FrameTransformer::new(XOR_TABLE.clone(), plan.clone(), w, h).unwrap();

        let p = planes(w * h, 9);
        let linear = identity.transform(as_planes(&p)).unwrap();
        let out = tiled.transform(as_planes(&p)).unwrap();

        let mut expected = vec![0; w * h];
        plan.apply(&linear, &mut expected).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_rejects_wrong_plane_sizes() {
        let (w, h) = (4, 4);
        let t = FrameTransformer::new(
            XOR_TABLE.clone(),
            Arc::new(CopyPlan::identity(w, h).unwrap()),
            w,
            h,
        )
        .unwrap();
        let short = (vec![0; 15], vec![0; 16], vec![0; 16]);
        assert!(matches!(t.transform(as_planes(&short)), Err(PipelineError::Transform(_))));

        let ok = (vec![0; 16], vec![0; 16], vec![0; 16]);
        let mut out = vec![0; 10];
        assert!(t.transform_into(as_planes(&ok), &mut out).is_err());
    }

    #[test]
    fn test_plan_must_match_frame() {
        let plan = Arc::new(CopyPlan::identity(4, 4).unwrap());
        assert!(FrameTransformer::new(XOR_TABLE.clone(), plan, 8, 4).is_err());
    }

    #[test]
    fn test_rejects_empty_frame() {
        let plan = Arc::new(CopyPlan::from_ranges(vec![], 0, 0).unwrap());
        for (w, h) in [(0, 5), (5, 0), (0, 0)] {
            assert!(matches!(
                FrameTransformer::new(XOR_TABLE.clone(), plan.clone(), w, h),
                Err(PipelineError::InvalidCopyPlan(_))
            ));
        }
    }
}
