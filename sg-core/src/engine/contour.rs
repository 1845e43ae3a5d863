//! Hot-region masks and external contour extraction
//!
//! Hot pixels are grouped into 8-connected blobs. Each blob's outer border is
//! followed with Moore-neighbour tracing from its top-left pixel; holes are
//! never traced. Contour area is the shoelace area of the polygon through the
//! boundary pixel centres, so a lone pixel or a one-pixel-wide line has zero
//! area.

/// Neighbour offsets, clockwise on screen (y grows downwards), starting east
const DIRS: [(isize, isize); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Direction index of west, the guaranteed-background side of a top-left pixel
const WEST: usize = 4;

/// Binary hot/cold mask
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: usize,
    height: usize,
    hot: Vec<bool>,
}

impl Mask {
    /// Mark every value at or above `threshold` as hot
    pub fn from_threshold(values: &[f64], width: usize, height: usize, threshold: f64) -> Self {
        debug_assert_eq!(values.len(), width * height);
        Self {
            width,
            height,
            hot: values.iter().map(|&v| v >= threshold).collect(),
        }
    }

    /// Build a mask from rows of `#` (hot) and `.` (cold)
    #[cfg(test)]
    pub(crate) fn from_rows(rows: &[&str]) -> Self {
        let height = rows.len();
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let hot = rows
            .iter()
            .flat_map(|r| r.bytes().map(|b| b == b'#'))
            .collect();
        Self { width, height, hot }
    }

    #[cfg(test)]
    pub(crate) fn hot_count(&self) -> usize {
        self.hot.iter().filter(|&&h| h).count()
    }

    pub fn is_hot(&self, x: usize, y: usize) -> bool {
        self.hot[y * self.width + x]
    }
}

/// Closed outer border of one blob, as pixel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<(isize, isize)>,
}

impl Contour {
    /// Shoelace area of the closed polygon
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let twice: isize = (0..n)
            .map(|i| {
                let (x0, y0) = self.points[i];
                let (x1, y1) = self.points[(i + 1) % n];
                x0 * y1 - x1 * y0
            })
            .sum();
        (twice as f64).abs() / 2.0
    }
}

/// Label 8-connected blobs; returns the label image and each blob's
/// top-left pixel in raster order
fn label_blobs(mask: &Mask) -> (Vec<u32>, Vec<(usize, usize)>) {
    let (w, h) = (mask.width, mask.height);
    let mut labels = vec![0u32; w * h];
    let mut starts = Vec::new();
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            if !mask.is_hot(x, y) || labels[y * w + x] != 0 {
                continue;
            }
            let id = starts.len() as u32 + 1;
            starts.push((x, y));
            labels[y * w + x] = id;
            stack.push((x, y));

            while let Some((cx, cy)) = stack.pop() {
                for (dx, dy) in DIRS {
                    let nx = cx as isize + dx;
                    let ny = cy as isize + dy;
                    if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                        continue;
                    }
                    let (nx, ny) = (nx as usize, ny as usize);
                    if mask.is_hot(nx, ny) && labels[ny * w + nx] == 0 {
                        labels[ny * w + nx] = id;
                        stack.push((nx, ny));
                    }
                }
            }
        }
    }

    (labels, starts)
}

/// Moore-neighbour trace of the blob labelled `id` starting at its
/// top-left pixel
fn trace_outer(labels: &[u32], width: usize, height: usize, id: u32, start: (usize, usize)) -> Contour {
    let inside = |x: isize, y: isize| -> bool {
        x >= 0
            && y >= 0
            && x < width as isize
            && y < height as isize
            && labels[y as usize * width + x as usize] == id
    };

    // First hot neighbour clockwise from `from`
    let next = |p: (isize, isize), from: usize| -> Option<((isize, isize), usize)> {
        (0..8).map(|k| (from + k) % 8).find_map(|d| {
            let q = (p.0 + DIRS[d].0, p.1 + DIRS[d].1);
            inside(q.0, q.1).then_some((q, d))
        })
    };

    let start = (start.0 as isize, start.1 as isize);
    let (second, first_dir) = match next(start, (WEST + 1) % 8) {
        Some(step) => step,
        None => return Contour { points: vec![start] },
    };

    let mut points = vec![start];
    let (mut current, mut dir) = (second, first_dir);
    // Hard stop for malformed label images
    let limit = 8 * width * height + 8;

    for _ in 0..limit {
        // The previous pixel is always a neighbour, so a step always exists
        let Some((following, following_dir)) = next(current, (dir + 6) % 8) else {
            break;
        };
        if current == start && following == second {
            break;
        }
        points.push(current);
        current = following;
        dir = following_dir;
    }

    Contour { points }
}

/// Outer contours of every hot blob, in raster order of their top-left pixel
pub fn external_contours(mask: &Mask) -> Vec<Contour> {
    let (labels, starts) = label_blobs(mask);
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| trace_outer(&labels, mask.width, mask.height, i as u32 + 1, start))
        .collect()
}

/// Area of the largest outer contour, or None if nothing is hot
pub fn largest_contour_area(mask: &Mask) -> Option<f64> {
    external_contours(mask)
        .iter()
        .map(Contour::area)
        .fold(None, |best, a| Some(best.map_or(a, |b: f64| b.max(a))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mask_has_no_contours() {
        let mask = Mask::from_rows(&["....", "....", "...."]);
        assert!(external_contours(&mask).is_empty());
        assert_eq!(largest_contour_area(&mask), None);
    }

    #[test]
    fn test_single_pixel_has_zero_area() {
        let mask = Mask::from_rows(&["...", ".#.", "..."]);
        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].points, vec![(1, 1)]);
        assert_eq!(contours[0].area(), 0.0);
    }

    #[test]
    fn test_line_has_zero_area() {
        let mask = Mask::from_rows(&[".....", ".###.", "....."]);
        assert_eq!(largest_contour_area(&mask), Some(0.0));
    }

    #[test]
    fn test_square_blocks() {
        let two = Mask::from_rows(&["##", "##"]);
        assert_eq!(largest_contour_area(&two), Some(1.0));

        let three = Mask::from_rows(&[".....", ".###.", ".###.", ".###.", "....."]);
        let contours = external_contours(&three);
        assert_eq!(
            contours[0].points,
            vec![(1, 1), (2, 1), (3, 1), (3, 2), (3, 3), (2, 3), (1, 3), (1, 2)]
        );
        assert_eq!(contours[0].area(), 4.0);
    }

    #[test]
    fn test_holes_are_ignored() {
        let ring = Mask::from_rows(&["#####", "#...#", "#...#", "#...#", "#####"]);
        let contours = external_contours(&ring);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].area(), 16.0);
    }

    #[test]
    fn test_largest_of_several_blobs() {
        let mask = Mask::from_rows(&[
            "##......",
            "##......",
            "........",
            "...####.",
            "...####.",
            "...####.",
            "...####.",
        ]);
        assert_eq!(external_contours(&mask).len(), 2);
        assert_eq!(largest_contour_area(&mask), Some(9.0));
    }

    #[test]
    fn test_diagonal_pixels_join_one_blob() {
        let mask = Mask::from_rows(&["#..", ".#.", "..#"]);
        assert_eq!(external_contours(&mask).len(), 1);
    }

    #[test]
    fn test_blob_touching_border() {
        let mask = Mask::from_rows(&["###", "###", "###"]);
        assert_eq!(largest_contour_area(&mask), Some(4.0));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mask = Mask::from_threshold(&[32.9, 33.0, 33.1, 10.0], 2, 2, 33.0);
        assert_eq!(mask.hot_count(), 2);
        assert!(!mask.is_hot(0, 0));
        assert!(mask.is_hot(1, 0));
        assert!(mask.is_hot(0, 1));
    }
}
