//! Convex hull facets of loudspeaker positions
//!
//! Layouts have at most a few dozen speakers, so facets are found by testing
//! every plane through three points; coplanar triangles are merged into
//! facets with any number of corners. The output order is deterministic.

use admr_core::Vec3;

use crate::error::{RenderError, RenderResult};

/// A facet of the hull: the indices of its corners in the input positions.
pub type Facet = Vec<usize>;

const PLANE_EPS: f64 = 1e-6;

/// Find the facets of the convex hull of `positions`, merging coplanar
/// triangles.
pub fn convex_hull_facets(positions: &[Vec3]) -> RenderResult<Vec<Facet>> {
    let n = positions.len();
    if n < 4 {
        return Err(RenderError::InvalidLayout(format!(
            "need at least 4 positions to triangulate, got {}",
            n
        )));
    }

    // each facet is stored with its outward plane (normal, offset) so that
    // coplanar triangles can be merged
    let mut facets: Vec<(Vec3, f64, Vec<usize>)> = Vec::new();

    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let normal = (positions[j] - positions[i])
                    .cross(positions[k] - positions[i]);
                if normal.norm() < PLANE_EPS {
                    continue;
                }
                let normal = normal * (1.0 / normal.norm());
                let offset = normal.dot(positions[i]);

                // all other points must lie on one side of the plane
                let mut above = false;
                let mut below = false;
                for (l, &p) in positions.iter().enumerate() {
                    if l == i || l == j || l == k {
                        continue;
                    }
                    let d = normal.dot(p) - offset;
                    if d > PLANE_EPS {
                        above = true;
                    } else if d < -PLANE_EPS {
                        below = true;
                    }
                }
                if above && below {
                    continue;
                }

                // orient the plane outwards
                let (normal, offset) = if above { (-normal, -offset) } else { (normal, offset) };

                match facets.iter_mut().find(|(fn_, fo, _)| {
                    (*fn_ - normal).norm() < 1e-5 && (fo - offset).abs() < 1e-5
                }) {
                    Some((_, _, verts)) => {
                        for v in [i, j, k] {
                            if !verts.contains(&v) {
                                verts.push(v);
                            }
                        }
                    }
                    None => facets.push((normal, offset, vec![i, j, k])),
                }
            }
        }
    }

    if facets.is_empty() {
        return Err(RenderError::InvalidLayout(
            "positions are degenerate; no hull facets found".into(),
        ));
    }

    let mut out: Vec<Facet> = facets
        .into_iter()
        .map(|(_, _, mut verts)| {
            verts.sort_unstable();
            verts
        })
        .collect();
    out.sort();
    Ok(out)
}

/// Vertices adjacent to `vert` in the hull: every other vertex of every facet
/// containing it.
pub fn adjacent_verts(facets: &[Facet], vert: usize) -> Vec<usize> {
    let mut adjacent: Vec<usize> = facets
        .iter()
        .filter(|f| f.contains(&vert))
        .flat_map(|f| f.iter().copied())
        .filter(|&v| v != vert)
        .collect();
    adjacent.sort_unstable();
    adjacent.dedup();
    adjacent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tetrahedron() {
        let positions = [
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(-1.0, -1.0, -1.0),
        ];
        let facets = convex_hull_facets(&positions).unwrap();
        assert_eq!(facets.len(), 4);
        for facet in &facets {
            assert_eq!(facet.len(), 3);
        }
    }

    #[test]
    fn test_octahedron_merges_nothing() {
        let positions = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, -1.0),
        ];
        let facets = convex_hull_facets(&positions).unwrap();
        assert_eq!(facets.len(), 8);
    }

    #[test]
    fn test_cube_merges_coplanar() {
        let mut positions = Vec::new();
        for &x in &[-1.0, 1.0] {
            for &y in &[-1.0, 1.0] {
                for &z in &[-1.0, 1.0] {
                    positions.push(Vec3::new(x, y, z));
                }
            }
        }
        let facets = convex_hull_facets(&positions).unwrap();
        assert_eq!(facets.len(), 6);
        for facet in &facets {
            assert_eq!(facet.len(), 4);
        }
    }

    #[test]
    fn test_adjacent_verts() {
        let positions = [
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(-1.0, -1.0, -1.0),
        ];
        let facets = convex_hull_facets(&positions).unwrap();
        // in a tetrahedron everything is adjacent to everything
        assert_eq!(adjacent_verts(&facets, 0), vec![1, 2, 3]);
    }
}
