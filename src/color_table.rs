//! Dense `(Y, Cb, Cr) -> palette index` lookup table.
//!
//! 256³ entries, one signed byte each (16 MiB). Built once, then shared
//! read-only by every worker.

use std::path::Path;

use rayon::prelude::*;

use crate::error::{PipelineError, Result};
use crate::palette::{Palette, Rgb};

pub const COLOR_TABLE_LEN: usize = 256 * 256 * 256;

#[inline]
pub fn table_offset(y: u8, cb: u8, cr: u8) -> usize {
    (y as usize) * 65536 + (cb as usize) * 256 + cr as usize
}

pub struct ColorTable {
    entries: Box<[u8]>,
}

impl std::fmt::Debug for ColorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorTable")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl ColorTable {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != COLOR_TABLE_LEN {
            return Err(PipelineError::InvalidColorTable(format!(
                "expected {} entries, got {}",
                COLOR_TABLE_LEN,
                bytes.len()
            )));
        }
        Ok(Self {
            entries: bytes.into_boxed_slice(),
        })
    }

    /// Every triple maps to `index`.
    pub fn uniform(index: i8) -> Result<Self> {
        Self::from_fn(|_, _, _| index)
    }

    /// Fills the table in parallel, one `Y` plane (65536 entries) per task.
    pub fn from_fn<F>(f: F) -> Result<Self>
    where
        F: Fn(u8, u8, u8) -> i8 + Sync,
    {
        let mut entries = alloc_entries()?;
        entries
            .par_chunks_mut(65536)
            .enumerate()
            .for_each(|(y, plane)| {
                for (i, entry) in plane.iter_mut().enumerate() {
                    *entry = f(y as u8, (i >> 8) as u8, (i & 0xff) as u8) as u8;
                }
            });
        Ok(Self {
            entries: entries.into_boxed_slice(),
        })
    }

    /// Nearest palette colour for every YCbCr triple.
    pub fn from_palette(palette: &Palette) -> Result<Self> {
        log::info!("building color table for {} palette colors", palette.len());
        Self::from_fn(|y, cb, cr| palette.nearest_index(Rgb::from_ycbcr(y, cb, cr)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(bytes)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), &self.entries)?;
        Ok(())
    }

    /// Loads a cached table, or builds it from `palette` and writes the
    /// cache when the file is missing or has the wrong size.
    pub fn load_or_build(path: impl AsRef<Path>, palette: &Palette) -> Result<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(table) => Ok(table),
            Err(e) => {
                log::warn!("color table cache {} unusable ({}), rebuilding", path.display(), e);
                let table = Self::from_palette(palette)?;
                table.save(path)?;
                Ok(table)
            }
        }
    }

    #[inline]
    pub fn lookup(&self, y: u8, cb: u8, cr: u8) -> i8 {
        self.entries[table_offset(y, cb, cr)] as i8
    }

    #[inline]
    pub fn get(&self, offset: usize) -> Option<i8> {
        self.entries.get(offset).map(|e| *e as i8)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.entries
    }
}

fn alloc_entries() -> Result<Vec<u8>> {
    let mut entries = Vec::new();
    entries
        .try_reserve_exact(COLOR_TABLE_LEN)
        .map_err(|_| PipelineError::Allocation {
            what: "color table",
            bytes: COLOR_TABLE_LEN,
        })?;
    entries.resize(COLOR_TABLE_LEN, 0);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_checks_length() {
        assert!(matches!(
            ColorTable::from_bytes(vec![0; 16]),
            Err(PipelineError::InvalidColorTable(_))
        ));
    }

    #[test]
    fn test_from_fn_layout() {
        let table = ColorTable::from_fn(|y, cb, cr| (y ^ cb ^ cr) as i8).unwrap();
        for (y, cb, cr) in [(0, 0, 0), (1, 2, 3), (255, 0, 7), (12, 255, 255), (200, 100, 50)] {
            assert_eq!(table.lookup(y, cb, cr), (y ^ cb ^ cr) as i8);
            assert_eq!(table.get(table_offset(y, cb, cr)), Some((y ^ cb ^ cr) as i8));
        }
        assert_eq!(table_offset(255, 255, 255), COLOR_TABLE_LEN - 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.bin");
        let table = ColorTable::from_fn(|y, _, cr| y.wrapping_add(cr) as i8).unwrap();
        table.save(&path).unwrap();
        let loaded = ColorTable::load(&path).unwrap();
        assert_eq!(loaded.as_bytes(), table.as_bytes());
    }

    #[test]
    fn test_load_or_build_replaces_bad_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let palette = Palette::new(vec![Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)], 0).unwrap();
        let table = ColorTable::load_or_build(&path, &palette).unwrap();
        assert_eq!(table.lookup(0, 128, 128), 0);
        assert_eq!(table.lookup(255, 128, 128), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, COLOR_TABLE_LEN);
    }
}
