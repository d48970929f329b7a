use crate::detect::result::BoundingBox;

/// Relative tolerance used when deciding whether two raw hits describe the same face.
pub const GROUP_EPS: f32 = 0.2;

/// Merge raw detector hits into faces and drop faces below `min_size`.
///
/// With `min_neighbors == 0` every raw hit is kept as-is. Otherwise hits are
/// clustered (two hits join when all four edges lie within `GROUP_EPS` of the
/// smaller box's mean side) and only clusters with more than `min_neighbors`
/// members survive, reported as the average of their members.
pub fn group_hits(
    raw: &[BoundingBox],
    min_neighbors: u32,
    min_size: (u32, u32),
) -> Vec<BoundingBox> {
    let grouped = if min_neighbors == 0 {
        raw.to_vec()
    } else {
        cluster(raw, min_neighbors)
    };
    grouped
        .into_iter()
        .filter(|b| b.width >= min_size.0 && b.height >= min_size.1)
        .collect()
}

fn cluster(raw: &[BoundingBox], min_neighbors: u32) -> Vec<BoundingBox> {
    let mut parent: Vec<usize> = (0..raw.len()).collect();
    for i in 0..raw.len() {
        for j in (i + 1)..raw.len() {
            if similar(&raw[i], &raw[j]) {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    parent[b] = a;
                }
            }
        }
    }

    // (sum x, sum y, sum w, sum h, members) per root, in first-seen order.
    let mut sums: Vec<(usize, [u64; 4], u32)> = Vec::new();
    for (i, hit) in raw.iter().enumerate() {
        let root = find(&mut parent, i);
        let pos = match sums.iter().position(|(r, _, _)| *r == root) {
            Some(pos) => pos,
            None => {
                sums.push((root, [0; 4], 0));
                sums.len() - 1
            }
        };
        let entry = &mut sums[pos];
        entry.1[0] += hit.x as u64;
        entry.1[1] += hit.y as u64;
        entry.1[2] += hit.width as u64;
        entry.1[3] += hit.height as u64;
        entry.2 += 1;
    }

    sums.into_iter()
        .filter(|(_, _, members)| *members > min_neighbors)
        .map(|(_, s, members)| {
            let n = members as u64;
            BoundingBox::new(
                (s[0] / n) as u32,
                (s[1] / n) as u32,
                (s[2] / n) as u32,
                (s[3] / n) as u32,
            )
        })
        .collect()
}

fn similar(a: &BoundingBox, b: &BoundingBox) -> bool {
    let delta = GROUP_EPS
        * (a.width.min(b.width) as f32 + a.height.min(b.height) as f32)
        * 0.5;
    let close = |p: u32, q: u32| (p as f32 - q as f32).abs() <= delta;
    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.x + a.width, b.x + b.width)
        && close(a.y + a.height, b.y + b.height)
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}
