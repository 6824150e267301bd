//! Optimization algorithms
//!
//! Thin wrapper around argmin's L-BFGS with a More-Thuente line search. Used to find
//! posterior modes; every parameter is unconstrained.

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use sk_core::traits::LogDensityModel;
use sk_core::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Configuration for the L-BFGS optimizer
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Convergence tolerance for gradient norm
    pub tol: f64,
    /// Number of corrections to approximate inverse Hessian
    pub m: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 1000, tol: 1e-6, m: 10 }
    }
}

/// Result of optimization
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best-fit parameters
    pub parameters: Vec<f64>,
    /// Function value at minimum
    pub fval: f64,
    /// Number of iterations
    pub n_iter: u64,
    /// Number of objective (cost) evaluations.
    pub n_fev: usize,
    /// Number of gradient evaluations.
    pub n_gev: usize,
    /// Convergence status
    pub converged: bool,
    /// Termination message
    pub message: String,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, n_fev={}, n_gev={}, converged={})",
            self.fval, self.n_iter, self.n_fev, self.n_gev, self.converged
        )
    }
}

/// Objective function trait for optimization
pub trait ObjectiveFunction: Send + Sync {
    /// Evaluate function at given parameters
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Compute gradient at given parameters (central differences if not overridden)
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let n = params.len();
        let mut grad = vec![0.0; n];
        let mut work = params.to_vec();

        for i in 0..n {
            let eps = 1e-8 * params[i].abs().max(1.0);
            work[i] = params[i] + eps;
            let f_plus = self.eval(&work)?;
            work[i] = params[i] - eps;
            let f_minus = self.eval(&work)?;
            work[i] = params[i];
            grad[i] = (f_plus - f_minus) / (2.0 * eps);
        }

        Ok(grad)
    }
}

/// Minimize the negative log-density of a [`LogDensityModel`].
pub struct NllObjective<'a, M: LogDensityModel + ?Sized>(pub &'a M);

impl<M: LogDensityModel + ?Sized> ObjectiveFunction for NllObjective<'_, M> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        self.0.nll(params)
    }

    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        self.0.grad_nll(params)
    }
}

#[derive(Default)]
struct FuncCounts {
    cost: AtomicUsize,
    grad: AtomicUsize,
}

/// Wrapper to make ObjectiveFunction compatible with argmin
struct ArgminProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    counts: Arc<FuncCounts>,
}

impl CostFunction for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.counts.cost.fetch_add(1, Ordering::Relaxed);
        let v = self.objective.eval(params).map_err(|e| argmin::core::Error::msg(e.to_string()))?;
        // Overflowing likelihoods become +inf so the line search backs off.
        Ok(if v.is_nan() { f64::INFINITY } else { v })
    }
}

impl Gradient for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(
        &self,
        params: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        self.counts.grad.fetch_add(1, Ordering::Relaxed);
        self.objective.gradient(params).map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

/// Unconstrained L-BFGS optimizer
pub struct LbfgsOptimizer {
    config: OptimizerConfig,
}

impl LbfgsOptimizer {
    /// Create new L-BFGS optimizer with given configuration
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Minimize `objective` starting from `init_params`.
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init_params: &[f64],
    ) -> Result<OptimizationResult> {
        if init_params.is_empty() {
            return Err(Error::Validation("cannot optimize over zero parameters".to_string()));
        }
        if init_params.iter().any(|v| !v.is_finite()) {
            return Err(Error::Validation("initial parameters must be finite".to_string()));
        }

        let counts = Arc::new(FuncCounts::default());
        let problem = ArgminProblem { objective, counts: counts.clone() };

        let linesearch = MoreThuenteLineSearch::new();
        // argmin's default cost tolerance (~EPS) is too strict for log-density scales.
        let tol_cost =
            if self.config.tol == 0.0 { 0.0 } else { (0.1 * self.config.tol).max(1e-12) };
        let solver = LBFGS::new(linesearch, self.config.m)
            .with_tolerance_grad(self.config.tol)
            .map_err(|e| Error::Validation(format!("Invalid optimizer configuration (tol): {e}")))?;
        let solver = solver.with_tolerance_cost(tol_cost).map_err(|e| {
            Error::Validation(format!("Invalid optimizer configuration (tol_cost): {e}"))
        })?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(init_params.to_vec()).max_iters(self.config.max_iter))
            .run()
            .map_err(|e| Error::Computation(format!("Optimization failed: {e}")))?;

        let state = res.state();
        let parameters = state
            .get_best_param()
            .ok_or_else(|| Error::Computation("No best parameters found".to_string()))?
            .clone();
        let fval = state.get_best_cost();
        let n_iter = state.get_iter();

        let termination = state.get_termination_status();
        let converged = matches!(
            termination,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );
        let message = termination.to_string();
        if !converged {
            log::warn!("L-BFGS stopped without converging after {n_iter} iterations: {message}");
        }

        Ok(OptimizationResult {
            parameters,
            fval,
            n_iter,
            n_fev: counts.cost.load(Ordering::Relaxed),
            n_gev: counts.grad.load(Ordering::Relaxed),
            converged,
            message,
        })
    }

    /// Find the mode of a log-density, starting from [`LogDensityModel::parameter_init`].
    pub fn find_mode<M: LogDensityModel + ?Sized>(&self, model: &M) -> Result<OptimizationResult> {
        self.minimize(&NllObjective(model), &model.parameter_init())
    }
}

impl Default for LbfgsOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}
