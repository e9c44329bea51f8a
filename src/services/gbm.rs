//! Gradient-boosted regression trees for price forecasting.
//!
//! # Algorithm
//!
//! Squared-loss boosting over small regression trees: the model starts at
//! the training mean and each round fits a depth-limited tree to the current
//! residuals, added with a fixed shrinkage factor. Splits are exact
//! (midpoints between sorted feature values, best SSE reduction wins).
//!
//! Training with ≥ 5 rows runs 5-fold cross-validation over sequential
//! chunks, retains the fold whose test RMSE is lowest, and reports the
//! average RMSE/MAE across folds as diagnostics. Fewer than 5 rows trains on
//! everything; zero rows means no model.

/// Boosting rounds.
const NUM_ROUNDS: usize = 100;

/// Shrinkage applied to each tree's contribution.
const LEARNING_RATE: f64 = 0.1;

/// Maximum tree depth.
const MAX_DEPTH: usize = 6;

/// Minimum samples per leaf.
const MIN_LEAF_SIZE: usize = 2;

/// Folds used for cross-validation when enough data exists.
const CV_FOLDS: usize = 5;

/// Minimum rows for cross-validated training.
const MIN_CV_ROWS: usize = 5;

// ---------------------------------------------------------------------------
// Regression tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Fit a tree to `targets` (the boosting residuals) over the rows in
    /// `indices`.
    fn fit(features: &[Vec<f64>], targets: &[f64], indices: &[usize]) -> Self {
        let mut tree = RegressionTree { nodes: Vec::new() };
        tree.grow(features, targets, indices, 0);
        tree
    }

    /// Recursively grow the subtree for `indices`, returning its node index.
    fn grow(
        &mut self,
        features: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        depth: usize,
    ) -> usize {
        let mean = mean_of(targets, indices);

        if depth >= MAX_DEPTH || indices.len() < 2 * MIN_LEAF_SIZE {
            return self.push(Node::Leaf(mean));
        }

        let Some((feature, threshold)) = best_split(features, targets, indices) else {
            return self.push(Node::Leaf(mean));
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| features[i][feature] <= threshold);

        if left_idx.len() < MIN_LEAF_SIZE || right_idx.len() < MIN_LEAF_SIZE {
            return self.push(Node::Leaf(mean));
        }

        // Reserve this node's slot before recursing so child indices are
        // known only after both subtrees exist.
        let slot = self.push(Node::Leaf(mean));
        let left = self.grow(features, targets, &left_idx, depth + 1);
        let right = self.grow(features, targets, &right_idx, depth + 1);
        self.nodes[slot] = Node::Split { feature, threshold, left, right };
        slot
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn predict(&self, x: &[f64]) -> f64 {
        let mut at = 0usize;
        loop {
            match &self.nodes[at] {
                Node::Leaf(v) => return *v,
                Node::Split { feature, threshold, left, right } => {
                    at = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

fn mean_of(values: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| values[i]).sum::<f64>() / indices.len() as f64
}

/// Best (feature, threshold) by SSE reduction, or None when nothing improves.
fn best_split(features: &[Vec<f64>], targets: &[f64], indices: &[usize]) -> Option<(usize, f64)> {
    let feature_count = features.first().map(|f| f.len()).unwrap_or(0);
    let total_sse = sse_of(targets, indices);
    let mut best: Option<(usize, f64, f64)> = None; // (feature, threshold, sse)

    for feature in 0..feature_count {
        let mut values: Vec<f64> = indices.iter().map(|&i| features[i][feature]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).expect("finite features"));
        values.dedup();
        for pair in values.windows(2) {
            let threshold = (pair[0] + pair[1]) / 2.0;
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| features[i][feature] <= threshold);
            if left.len() < MIN_LEAF_SIZE || right.len() < MIN_LEAF_SIZE {
                continue;
            }
            let split_sse = sse_of(targets, &left) + sse_of(targets, &right);
            if split_sse + 1e-12 < best.map(|(_, _, s)| s).unwrap_or(total_sse) {
                best = Some((feature, threshold, split_sse));
            }
        }
    }

    best.map(|(f, t, _)| (f, t))
}

fn sse_of(values: &[f64], indices: &[usize]) -> f64 {
    let mean = mean_of(values, indices);
    indices.iter().map(|&i| (values[i] - mean).powi(2)).sum()
}

// ---------------------------------------------------------------------------
// Boosted ensemble
// ---------------------------------------------------------------------------

/// A trained gradient-boosted model.
#[derive(Debug, Clone)]
pub struct GradientBoostedModel {
    base: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedModel {
    /// Train on the full data set. Returns None for empty input.
    fn train(features: &[Vec<f64>], targets: &[f64]) -> Option<Self> {
        if features.is_empty() || features.len() != targets.len() {
            return None;
        }
        let indices: Vec<usize> = (0..features.len()).collect();
        let base = targets.iter().sum::<f64>() / targets.len() as f64;
        let mut predictions = vec![base; targets.len()];
        let mut trees = Vec::with_capacity(NUM_ROUNDS);

        for _ in 0..NUM_ROUNDS {
            let residuals: Vec<f64> = targets
                .iter()
                .zip(&predictions)
                .map(|(y, p)| y - p)
                .collect();
            let tree = RegressionTree::fit(features, &residuals, &indices);
            for (i, prediction) in predictions.iter_mut().enumerate() {
                *prediction += LEARNING_RATE * tree.predict(&features[i]);
            }
            trees.push(tree);
        }

        Some(Self { base, trees })
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        self.base
            + LEARNING_RATE
                * self
                    .trees
                    .iter()
                    .map(|t| t.predict(x))
                    .sum::<f64>()
    }
}

/// Cross-validation diagnostics for a trained model.
#[derive(Debug, Clone, Copy)]
pub struct ModelDiagnostics {
    /// Average test RMSE across folds (training RMSE without CV).
    pub avg_rmse: f64,
    /// Average test MAE across folds.
    pub avg_mae: f64,
    /// Coefficient of determination on the retained fold's test chunk.
    pub r_squared: f64,
}

/// A model plus its diagnostics.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: GradientBoostedModel,
    pub diagnostics: ModelDiagnostics,
}

/// Train with 5-fold sequential cross-validation, retaining the fold whose
/// test RMSE is lowest. Fewer than 5 rows trains on everything (diagnostics
/// against the training set); zero rows returns None.
pub fn train_with_cv(features: &[Vec<f64>], targets: &[f64]) -> Option<TrainedModel> {
    if features.is_empty() || features.len() != targets.len() {
        return None;
    }

    if features.len() < MIN_CV_ROWS {
        let model = GradientBoostedModel::train(features, targets)?;
        let all: Vec<usize> = (0..targets.len()).collect();
        let (rmse, mae, r2) = evaluate(&model, features, targets, &all);
        return Some(TrainedModel {
            model,
            diagnostics: ModelDiagnostics { avg_rmse: rmse, avg_mae: mae, r_squared: r2 },
        });
    }

    let n = features.len();
    let chunk = n.div_ceil(CV_FOLDS);
    let mut best: Option<(f64, GradientBoostedModel, f64)> = None; // (rmse, model, r²)
    let mut rmse_sum = 0.0;
    let mut mae_sum = 0.0;
    let mut folds_run = 0usize;

    for fold in 0..CV_FOLDS {
        let test_start = fold * chunk;
        let test_end = ((fold + 1) * chunk).min(n);
        if test_start >= test_end {
            continue;
        }
        let test_idx: Vec<usize> = (test_start..test_end).collect();
        let train_idx: Vec<usize> = (0..n).filter(|i| !(test_start..test_end).contains(i)).collect();
        if train_idx.is_empty() {
            continue;
        }

        let train_features: Vec<Vec<f64>> = train_idx.iter().map(|&i| features[i].clone()).collect();
        let train_targets: Vec<f64> = train_idx.iter().map(|&i| targets[i]).collect();
        let Some(model) = GradientBoostedModel::train(&train_features, &train_targets) else {
            continue;
        };

        let (rmse, mae, r2) = evaluate(&model, features, targets, &test_idx);
        rmse_sum += rmse;
        mae_sum += mae;
        folds_run += 1;

        if best.as_ref().map(|(b, _, _)| rmse < *b).unwrap_or(true) {
            best = Some((rmse, model, r2));
        }
    }

    let (_, model, r_squared) = best?;
    Some(TrainedModel {
        model,
        diagnostics: ModelDiagnostics {
            avg_rmse: rmse_sum / folds_run as f64,
            avg_mae: mae_sum / folds_run as f64,
            r_squared,
        },
    })
}

/// RMSE, MAE and r² of a model over the given row indices.
fn evaluate(
    model: &GradientBoostedModel,
    features: &[Vec<f64>],
    targets: &[f64],
    indices: &[usize],
) -> (f64, f64, f64) {
    let n = indices.len() as f64;
    let mut sq_sum = 0.0;
    let mut abs_sum = 0.0;
    for &i in indices {
        let err = targets[i] - model.predict(&features[i]);
        sq_sum += err * err;
        abs_sum += err.abs();
    }
    let rmse = (sq_sum / n).sqrt();
    let mae = abs_sum / n;

    let mean = mean_of(targets, indices);
    let sst: f64 = indices.iter().map(|&i| (targets[i] - mean).powi(2)).sum();
    let r_squared = if sst > 0.0 { (1.0 - sq_sum / sst).max(0.0) } else { 0.0 };
    (rmse, mae, r_squared)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = 10·x0 + x1 with a little structure, enough rows for CV.
    fn synthetic_data(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut xs = Vec::with_capacity(n);
        let mut ys = Vec::with_capacity(n);
        for i in 0..n {
            let x0 = (i % 7) as f64;
            let x1 = (i % 12) as f64;
            xs.push(vec![x0, x1]);
            ys.push(10.0 * x0 + x1);
        }
        (xs, ys)
    }

    #[test]
    fn test_train_empty_returns_none() {
        assert!(train_with_cv(&[], &[]).is_none());
    }

    #[test]
    fn test_train_few_rows_skips_cv() {
        let xs = vec![vec![1.0], vec![2.0], vec![3.0]];
        let ys = vec![100.0, 200.0, 300.0];
        let trained = train_with_cv(&xs, &ys).expect("3 rows still train");
        let p = trained.model.predict(&[2.0]);
        assert!((100.0..=300.0).contains(&p), "prediction within target range, got {}", p);
    }

    #[test]
    fn test_constant_targets_predict_constant() {
        let xs: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let ys = vec![1500.0; 10];
        let trained = train_with_cv(&xs, &ys).unwrap();
        let p = trained.model.predict(&[4.5]);
        assert!((p - 1500.0).abs() < 1e-6, "constant data predicts the constant, got {}", p);
    }

    #[test]
    fn test_learns_structure() {
        let (xs, ys) = synthetic_data(70);
        let trained = train_with_cv(&xs, &ys).expect("enough rows");
        // Two points with very different x0 should be clearly separated
        let low = trained.model.predict(&[0.0, 0.0]);
        let high = trained.model.predict(&[6.0, 6.0]);
        assert!(
            high - low > 30.0,
            "boosted trees should learn the x0 slope: low={}, high={}",
            low,
            high
        );
    }

    #[test]
    fn test_diagnostics_reasonable() {
        let (xs, ys) = synthetic_data(70);
        let trained = train_with_cv(&xs, &ys).unwrap();
        let d = trained.diagnostics;
        assert!(d.avg_rmse >= 0.0 && d.avg_rmse.is_finite());
        assert!(d.avg_mae >= 0.0 && d.avg_mae <= d.avg_rmse + 1e-9, "MAE ≤ RMSE");
        assert!((0.0..=1.0).contains(&d.r_squared));
    }

    #[test]
    fn test_training_is_deterministic() {
        let (xs, ys) = synthetic_data(40);
        let a = train_with_cv(&xs, &ys).unwrap();
        let b = train_with_cv(&xs, &ys).unwrap();
        let x = vec![3.0, 5.0];
        assert_eq!(a.model.predict(&x), b.model.predict(&x), "no hidden randomness");
    }
}
