//! Hungarian algorithm for optimal assignment
//!
//! Finds a minimum-total-cost one-to-one pairing between the rows (tracks)
//! and columns (observations) of a rectangular cost matrix. Rectangular
//! problems are squared up with zero-cost dummy rows or columns; pairs that
//! land on a dummy are dropped from the result.
//!
//! The solver is deterministic for a given cost matrix: zeros are scanned in
//! row-major order at every step.

use ndarray::Array2;

/// Marks placed on zeros of the reduced cost matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    None,
    Star,
    Prime,
}

/// Steps of the main loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    CoverColumns,
    PrimeZeros,
    Augment(usize, usize),
    AdjustCosts,
    Done,
}

/// Hungarian algorithm result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    /// `(row, column)` pairs in ascending row order
    pub pairs: Vec<(usize, usize)>,
    /// Total cost of the assigned pairs
    pub cost: f64,
}

impl Assignment {
    /// Column assigned to `row`, if any
    pub fn column_for(&self, row: usize) -> Option<usize> {
        self.pairs.iter().find(|(r, _)| *r == row).map(|(_, c)| *c)
    }
}

/// Hungarian algorithm for optimal assignment
///
/// # Arguments
/// * `costs` - Cost matrix (rows × columns), all entries finite
///
/// # Returns
/// [`Assignment`] covering `min(rows, columns)` pairs
pub fn hungarian(costs: &Array2<f64>) -> Assignment {
    let (rows, cols) = costs.dim();
    if rows == 0 || cols == 0 {
        return Assignment::default();
    }

    let size = rows.max(cols);
    let mut reduced = Array2::zeros((size, size));
    for ((i, j), &value) in costs.indexed_iter() {
        reduced[(i, j)] = value;
    }

    let marks = solve(&mut reduced);

    let mut pairs = Vec::with_capacity(rows.min(cols));
    let mut cost = 0.0;
    for i in 0..rows {
        for j in 0..cols {
            if marks[(i, j)] == Mark::Star {
                pairs.push((i, j));
                cost += costs[(i, j)];
            }
        }
    }

    Assignment { pairs, cost }
}

/// Main Hungarian algorithm loop over a square matrix
fn solve(costs: &mut Array2<f64>) -> Array2<Mark> {
    let size = costs.nrows();
    let mut row_cover = vec![false; size];
    let mut col_cover = vec![false; size];

    reduce_rows(costs);
    let mut marks = star_initial_zeros(costs);

    let mut step = Step::CoverColumns;
    loop {
        step = match step {
            Step::CoverColumns => cover_starred_columns(&marks, &mut col_cover),
            Step::PrimeZeros => {
                prime_uncovered_zeros(costs, &mut marks, &mut row_cover, &mut col_cover)
            }
            Step::Augment(r, c) => {
                augment_path(&mut marks, r, c, &mut row_cover, &mut col_cover)
            }
            Step::AdjustCosts => adjust_costs(costs, &row_cover, &col_cover),
            Step::Done => break,
        };
    }

    marks
}

/// Step 1: Subtract row minimums
fn reduce_rows(costs: &mut Array2<f64>) {
    for mut row in costs.rows_mut() {
        let row_min = row.iter().cloned().fold(f64::INFINITY, f64::min);
        row.mapv_inplace(|v| v - row_min);
    }
}

/// Step 2: Star one zero per row and column where possible
fn star_initial_zeros(costs: &Array2<f64>) -> Array2<Mark> {
    let size = costs.nrows();
    let mut marks = Array2::from_elem((size, size), Mark::None);
    let mut row_starred = vec![false; size];
    let mut col_starred = vec![false; size];

    for i in 0..size {
        for j in 0..size {
            if costs[(i, j)] == 0.0 && !row_starred[i] && !col_starred[j] {
                marks[(i, j)] = Mark::Star;
                row_starred[i] = true;
                col_starred[j] = true;
            }
        }
    }

    marks
}

/// Step 3: Cover columns with starred zeros
fn cover_starred_columns(marks: &Array2<Mark>, col_cover: &mut [bool]) -> Step {
    for (j, column) in marks.columns().into_iter().enumerate() {
        if column.iter().any(|&m| m == Mark::Star) {
            col_cover[j] = true;
        }
    }

    if col_cover.iter().all(|&c| c) {
        Step::Done
    } else {
        Step::PrimeZeros
    }
}

/// Step 4: Find uncovered zeros and prime them
fn prime_uncovered_zeros(
    costs: &Array2<f64>,
    marks: &mut Array2<Mark>,
    row_cover: &mut [bool],
    col_cover: &mut [bool],
) -> Step {
    let size = costs.nrows();

    loop {
        let Some((r, c)) = find_uncovered_zero(costs, row_cover, col_cover) else {
            return Step::AdjustCosts;
        };

        marks[(r, c)] = Mark::Prime;

        match (0..size).find(|&j| marks[(r, j)] == Mark::Star) {
            Some(star_col) => {
                row_cover[r] = true;
                col_cover[star_col] = false;
            }
            None => return Step::Augment(r, c),
        }
    }
}

fn find_uncovered_zero(
    costs: &Array2<f64>,
    row_cover: &[bool],
    col_cover: &[bool],
) -> Option<(usize, usize)> {
    let size = costs.nrows();
    for i in (0..size).filter(|&i| !row_cover[i]) {
        for j in (0..size).filter(|&j| !col_cover[j]) {
            if costs[(i, j)] == 0.0 {
                return Some((i, j));
            }
        }
    }
    None
}

/// Step 5: Augment matching along the alternating star/prime path
fn augment_path(
    marks: &mut Array2<Mark>,
    row: usize,
    col: usize,
    row_cover: &mut [bool],
    col_cover: &mut [bool],
) -> Step {
    let size = marks.nrows();
    let mut path = vec![(row, col)];

    loop {
        let (_, last_col) = path[path.len() - 1];
        let Some(star_row) = (0..size).find(|&i| marks[(i, last_col)] == Mark::Star) else {
            break;
        };
        path.push((star_row, last_col));

        // A starred zero reached through the path always has a primed zero in its row
        let Some(prime_col) = (0..size).find(|&j| marks[(star_row, j)] == Mark::Prime) else {
            break;
        };
        path.push((star_row, prime_col));
    }

    for &(i, j) in &path {
        marks[(i, j)] = match marks[(i, j)] {
            Mark::Star => Mark::None,
            _ => Mark::Star,
        };
    }

    row_cover.fill(false);
    col_cover.fill(false);
    marks.mapv_inplace(|m| if m == Mark::Prime { Mark::None } else { m });

    Step::CoverColumns
}

/// Step 6: Add minimum to covered rows, subtract from uncovered columns
fn adjust_costs(costs: &mut Array2<f64>, row_cover: &[bool], col_cover: &[bool]) -> Step {
    let size = costs.nrows();

    let mut min_value = f64::INFINITY;
    for i in (0..size).filter(|&i| !row_cover[i]) {
        for j in (0..size).filter(|&j| !col_cover[j]) {
            min_value = min_value.min(costs[(i, j)]);
        }
    }

    for i in 0..size {
        for j in 0..size {
            if row_cover[i] {
                costs[(i, j)] += min_value;
            }
            if !col_cover[j] {
                costs[(i, j)] -= min_value;
            }
        }
    }

    Step::PrimeZeros
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Exhaustive minimum over all row permutations (small square matrices only)
    fn brute_force_min(costs: &Array2<f64>) -> f64 {
        fn recurse(costs: &Array2<f64>, row: usize, used: &mut Vec<bool>) -> f64 {
            if row == costs.nrows() {
                return 0.0;
            }
            let mut best = f64::INFINITY;
            for j in 0..costs.ncols() {
                if !used[j] {
                    used[j] = true;
                    best = best.min(costs[(row, j)] + recurse(costs, row + 1, used));
                    used[j] = false;
                }
            }
            best
        }
        recurse(costs, 0, &mut vec![false; costs.ncols()])
    }

    #[test]
    fn test_hungarian_simple() {
        let costs = array![[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [3.0, 6.0, 9.0]];

        let result = hungarian(&costs);

        assert_eq!(result.pairs.len(), 3);
        let mut cols: Vec<usize> = result.pairs.iter().map(|(_, c)| *c).collect();
        cols.sort_unstable();
        assert_eq!(cols, vec![0, 1, 2]);
        assert!((result.cost - brute_force_min(&costs)).abs() < 1e-10);
        assert!((result.cost - 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_hungarian_prefers_global_optimum_over_greedy() {
        // Greedy on row 0 would take column 0 (cost 1) and force row 1 onto cost 10.
        let costs = array![[1.0, 2.0], [1.5, 10.0]];
        let result = hungarian(&costs);
        assert_eq!(result.pairs, vec![(0, 1), (1, 0)]);
        assert!((result.cost - 3.5).abs() < 1e-10);
    }

    #[test]
    fn test_hungarian_rectangular() {
        // More observations than tracks
        let wide = array![[5.0, 1.0, 9.0], [4.0, 8.0, 2.0]];
        let result = hungarian(&wide);
        assert_eq!(result.pairs, vec![(0, 1), (1, 2)]);
        assert!((result.cost - 3.0).abs() < 1e-10);

        // More tracks than observations
        let tall = array![[5.0], [1.0], [3.0]];
        let result = hungarian(&tall);
        assert_eq!(result.pairs, vec![(1, 0)]);
        assert_eq!(result.column_for(1), Some(0));
        assert_eq!(result.column_for(0), None);
    }

    #[test]
    fn test_hungarian_matches_brute_force() {
        let costs = array![
            [7.0, 53.0, 183.0, 439.0],
            [497.0, 383.0, 563.0, 79.0],
            [627.0, 343.0, 773.0, 959.0],
            [447.0, 283.0, 463.0, 29.0]
        ];
        let result = hungarian(&costs);
        assert!((result.cost - brute_force_min(&costs)).abs() < 1e-9);
    }

    #[test]
    fn test_hungarian_empty() {
        let costs: Array2<f64> = Array2::zeros((0, 3));
        let result = hungarian(&costs);
        assert!(result.pairs.is_empty());
        assert_eq!(result.cost, 0.0);
    }
}
