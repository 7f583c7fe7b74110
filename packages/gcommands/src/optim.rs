//! Optimizer selection.
//!
//! `adam` maps onto Candle's [`AdamW`] with the decoupled weight decay
//! switched off, which is plain Adam.  Candle's own SGD has no momentum, so
//! `sgd` is served by [`MomentumSgd`].

use candle_core::{Result as CandleResult, Tensor, Var, backprop::GradStore};
use candle_nn::{
    Optimizer,
    optim::{AdamW, ParamsAdamW},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Optimizer families selectable from the command line.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, EnumString, IntoStaticStr, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

/* ------------------------------------------------------------------ */
/*  SGD with heavy-ball momentum                                       */
/* ------------------------------------------------------------------ */

#[derive(Clone, Copy, Debug)]
pub struct ParamsSgd {
    pub lr: f64,
    pub momentum: f64,
}

impl Default for ParamsSgd {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            momentum: 0.9,
        }
    }
}

struct VarSgd {
    var: Var,
    // velocity; `None` until the variable first receives a gradient
    buf: Option<Tensor>,
}

/// `v ← μ·v + g` (`v ← g` on the first step), `θ ← θ − lr·v`.
pub struct MomentumSgd {
    vars: Vec<VarSgd>,
    params: ParamsSgd,
}

impl Optimizer for MomentumSgd {
    type Config = ParamsSgd;

    fn new(vars: Vec<Var>, params: ParamsSgd) -> CandleResult<Self> {
        let vars = vars
            .into_iter()
            .filter(|v| v.dtype().is_float())
            .map(|var| VarSgd { var, buf: None })
            .collect();
        Ok(Self { vars, params })
    }

    fn step(&mut self, grads: &GradStore) -> CandleResult<()> {
        let ParamsSgd { lr, momentum } = self.params;
        for st in self.vars.iter_mut() {
            let Some(g) = grads.get(st.var.as_tensor()) else {
                continue;
            };
            let buf = match st.buf.take() {
                Some(prev) if momentum != 0.0 => ((prev * momentum)? + g)?,
                _ => g.clone(),
            };
            st.var.set(&st.var.sub(&(&buf * lr)?)?)?;
            st.buf = Some(buf);
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr;
    }
}

/* ------------------------------------------------------------------ */
/*  Runtime dispatch                                                   */
/* ------------------------------------------------------------------ */

/// The optimizer driving one training run.
pub enum RunOptimizer {
    Adam(AdamW),
    Sgd(MomentumSgd),
}

impl RunOptimizer {
    pub fn new(kind: OptimizerKind, lr: f64, momentum: f64, vars: Vec<Var>) -> CandleResult<Self> {
        Ok(match kind {
            OptimizerKind::Adam => Self::Adam(AdamW::new(
                vars,
                ParamsAdamW {
                    lr,
                    weight_decay: 0.0,
                    ..Default::default()
                },
            )?),
            OptimizerKind::Sgd => Self::Sgd(MomentumSgd::new(vars, ParamsSgd { lr, momentum })?),
        })
    }

    pub fn backward_step(&mut self, loss: &Tensor) -> CandleResult<()> {
        match self {
            Self::Adam(o) => o.backward_step(loss),
            Self::Sgd(o) => o.backward_step(loss),
        }
    }

    pub fn learning_rate(&self) -> f64 {
        match self {
            Self::Adam(o) => o.learning_rate(),
            Self::Sgd(o) => o.learning_rate(),
        }
    }

    pub fn kind(&self) -> OptimizerKind {
        match self {
            Self::Adam(_) => OptimizerKind::Adam,
            Self::Sgd(_) => OptimizerKind::Sgd,
        }
    }
}
