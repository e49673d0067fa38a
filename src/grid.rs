use std::collections::{HashMap, HashSet};

use crate::entity::Entity;
use crate::error::{PhysicsError, Result};
use crate::pair::UnorderedPair;
use crate::types::*;

/// Uniform-cell broad phase over entity world bounds.
///
/// Cells are never patched: callers `clear()` and re-insert everything before
/// each use.
#[derive(Clone, Debug)]
pub struct CollisionGrid {
    cell_width: f32,
    cell_height: f32,
    // cell coord -> entities whose bounds touch the cell
    cells: HashMap<(i32, i32), Vec<EntityId>>,
}

impl CollisionGrid {
    pub fn new(cell_width: f32, cell_height: f32) -> Result<Self> {
        let valid = |v: f32| v.is_finite() && v > 0.0;
        if !valid(cell_width) || !valid(cell_height) {
            return Err(PhysicsError::InvalidCellSize(cell_width, cell_height));
        }
        Ok(Self { cell_width, cell_height, cells: HashMap::new() })
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn cells(&self) -> &HashMap<(i32, i32), Vec<EntityId>> {
        &self.cells
    }

    /// Cell ranges `[x0, x1) x [y0, y1)` covered by `rect`. Both edges are
    /// inclusive, so a rect ending on a cell boundary also claims the next cell
    /// and edge-touching rects always share one.
    fn index_bounds(&self, rect: &Rect) -> (i32, i32, i32, i32) {
        let x0 = (rect.min.x / self.cell_width).floor() as i32;
        let y0 = (rect.min.y / self.cell_height).floor() as i32;
        let x1 = (rect.max.x / self.cell_width).floor() as i32 + 1;
        let y1 = (rect.max.y / self.cell_height).floor() as i32 + 1;
        (x0, y0, x1, y1)
    }

    /// Reference `entity` from every cell its hit boxes overlap. No-op without hit boxes.
    pub fn insert<T: EntityType>(&mut self, entity: &Entity<T>) {
        let Some(bounds) = entity.world_bounds() else {
            return;
        };
        let (x0, y0, x1, y1) = self.index_bounds(&bounds);
        for iy in y0..y1 {
            for ix in x0..x1 {
                self.cells.entry((ix, iy)).or_default().push(entity.id());
            }
        }
    }

    /// Every unordered pair of entities sharing at least one cell, once.
    pub fn candidate_pairs(&self) -> Vec<(EntityId, EntityId)> {
        let mut seen: HashSet<UnorderedPair<EntityId>> = HashSet::new();
        let mut out = Vec::new();
        for ids in self.cells.values() {
            for i0 in 0..ids.len() {
                for i1 in (i0 + 1)..ids.len() {
                    let (a, b) = (ids[i0], ids[i1]);
                    if a == b || !seen.insert(UnorderedPair::new(a, b)) {
                        continue;
                    }
                    out.push((a, b));
                }
            }
        }
        out
    }

    /// Entities referenced by any cell `rect` overlaps, once each.
    pub fn query(&self, rect: &Rect) -> Vec<EntityId> {
        let (x0, y0, x1, y1) = self.index_bounds(rect);
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for iy in y0..y1 {
            for ix in x0..x1 {
                if let Some(ids) = self.cells.get(&(ix, iy)) {
                    out.extend(ids.iter().copied().filter(|id| seen.insert(*id)));
                }
            }
        }
        out
    }
}
