//! Formula variants.
//!
//! A variable is computed by one [`Formula`]: a [`DirectFormula`] leaf, or a
//! group of nested formulas choosing among candidates ([`AlternativeFormulas`],
//! [`DatedFormula`], [`SelectFormula`]). Every variant shares one contract:
//! given a requested period, produce an output period and a result, or
//! report the result absent when evaluating lazily.

pub mod alternatives;
pub mod context;
pub mod dated;
pub mod direct;
pub mod select;

use std::collections::BTreeSet;
use std::sync::Arc;

pub use alternatives::AlternativeFormulas;
pub use context::FormulaContext;
pub use dated::{DatedFormula, DatedFormulaBuilder, DatedSlice};
pub use direct::{
    DirectFormula, DirectFormulaBuilder, FormulaFn, FormulaInput, FormulaParameter, LawInstant, OutputPeriodRule,
    PeriodRule,
};
pub use select::SelectFormula;

use crate::error::CalcResult;
use crate::simulation::{RequestTracker, Simulation};
use crate::time::Period;
use crate::trace::{ChoiceDescription, FormulaDescription, InputDescription, SliceDescription};
use crate::value::Array;
use crate::variable::Variable;

/// Computation strategy bound to a variable.
#[derive(Debug, Clone)]
pub enum Formula {
    /// One function over declared inputs.
    Direct(DirectFormula),
    /// First candidate that resolves.
    Alternatives(AlternativeFormulas),
    /// One formula per validity range.
    Dated(DatedFormula),
    /// Formula chosen by which main input is known.
    Select(SelectFormula),
}

/// Outcome of computing a formula for one request.
#[derive(Debug, Clone)]
pub(crate) struct Resolution {
    pub period: Period,
    pub array: Option<Arc<Array>>,
    /// Candidate indices from the root formula to the leaf that produced the
    /// array.
    pub used: Vec<usize>,
}

impl Resolution {
    pub fn present(period: Period, array: Arc<Array>) -> Self {
        Self {
            period,
            array: Some(array),
            used: Vec::new(),
        }
    }

    pub fn absent(period: Period) -> Self {
        Self {
            period,
            array: None,
            used: Vec::new(),
        }
    }

    /// Prefixes the used path with the candidate `index` of the enclosing group.
    #[must_use]
    pub fn used_at(mut self, index: usize) -> Self {
        self.used.insert(0, index);
        self
    }
}

impl Formula {
    pub(crate) fn compute(
        &self,
        sim: &mut Simulation,
        variable: &Variable,
        period: Period,
        lazy: bool,
        tracker: &mut RequestTracker,
    ) -> CalcResult<Resolution> {
        match self {
            Self::Direct(formula) => formula.compute(sim, variable, period, lazy, tracker),
            Self::Alternatives(formula) => formula.compute(sim, variable, period, lazy, tracker),
            Self::Dated(formula) => formula.compute(sim, variable, period, lazy, tracker),
            Self::Select(formula) => formula.compute(sim, variable, period, lazy, tracker),
        }
    }

    /// Direct formulas nested one level down, in candidate order.
    #[must_use]
    pub fn candidates(&self) -> Vec<&Formula> {
        match self {
            Self::Direct(_) => Vec::new(),
            Self::Alternatives(formula) => formula.candidates().iter().collect(),
            Self::Dated(formula) => formula.slices().iter().map(|slice| &slice.formula).collect(),
            Self::Select(formula) => formula.choices().iter().map(|(_, f)| f).collect(),
        }
    }

    /// The direct formula reached by following `used` candidate indices.
    ///
    /// A direct formula is its own real formula; a group with an empty or
    /// out-of-range path has none.
    #[must_use]
    pub fn real_formula(&self, used: &[usize]) -> Option<&DirectFormula> {
        match self {
            Self::Direct(formula) => Some(formula),
            _ => {
                let (&index, rest) = used.split_first()?;
                self.candidates().get(index)?.real_formula(rest)
            }
        }
    }

    /// Every variable read by this formula or a nested one, main variables of
    /// selections included.
    #[must_use]
    pub fn input_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_inputs(&mut names);
        names
    }

    fn collect_inputs(&self, names: &mut BTreeSet<String>) {
        match self {
            Self::Direct(formula) => names.extend(formula.input_names().map(str::to_string)),
            Self::Select(formula) => {
                names.extend(formula.main_variables().map(str::to_string));
                for (_, nested) in formula.choices() {
                    nested.collect_inputs(names);
                }
            }
            Self::Alternatives(_) | Self::Dated(_) => {
                for nested in self.candidates() {
                    nested.collect_inputs(names);
                }
            }
        }
    }

    /// Serializable description of the formula tree.
    #[must_use]
    pub fn describe(&self) -> FormulaDescription {
        match self {
            Self::Direct(formula) => FormulaDescription::Direct {
                inputs: formula
                    .inputs()
                    .iter()
                    .map(|input| InputDescription {
                        name: input.name.clone(),
                        period: format!("{:?}", input.period),
                    })
                    .collect(),
                parameters: formula
                    .parameters()
                    .iter()
                    .map(|parameter| (parameter.name.clone(), parameter.path.to_string()))
                    .collect(),
                output_period: format!("{:?}", formula.output_period_rule()),
                comment: formula.comment().map(str::to_string),
            },
            Self::Alternatives(formula) => FormulaDescription::Alternatives {
                candidates: formula.candidates().iter().map(Self::describe).collect(),
            },
            Self::Dated(formula) => FormulaDescription::Dated {
                slices: formula
                    .slices()
                    .iter()
                    .map(|slice| SliceDescription {
                        start: slice.start,
                        stop: slice.stop,
                        formula: slice.formula.describe(),
                    })
                    .collect(),
            },
            Self::Select(formula) => FormulaDescription::Select {
                choices: formula
                    .choices()
                    .iter()
                    .map(|(main, nested)| ChoiceDescription {
                        main: main.clone(),
                        formula: nested.describe(),
                    })
                    .collect(),
            },
        }
    }
}

impl From<DirectFormula> for Formula {
    fn from(formula: DirectFormula) -> Self {
        Self::Direct(formula)
    }
}

impl From<AlternativeFormulas> for Formula {
    fn from(formula: AlternativeFormulas) -> Self {
        Self::Alternatives(formula)
    }
}

impl From<DatedFormula> for Formula {
    fn from(formula: DatedFormula) -> Self {
        Self::Dated(formula)
    }
}

impl From<SelectFormula> for Formula {
    fn from(formula: SelectFormula) -> Self {
        Self::Select(formula)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Instant;

    fn leaf(inputs: &[&str]) -> Formula {
        inputs
            .iter()
            .fold(DirectFormula::builder(|_| Ok(Array::Int(Vec::new()))), |builder, name| {
                builder.input(*name)
            })
            .build()
            .unwrap()
            .into()
    }

    fn nested() -> Formula {
        let dated = DatedFormula::builder()
            .slice(Instant::new(2010, 1, 1).unwrap(), None, leaf(&["a"]))
            .slice(
                Instant::new(2015, 1, 1).unwrap(),
                None,
                AlternativeFormulas::new(vec![leaf(&["b"]), leaf(&["c", "a"])]).unwrap(),
            )
            .build()
            .unwrap();
        SelectFormula::new(vec![("main".to_string(), dated.into()), ("other".to_string(), leaf(&[]))])
            .unwrap()
            .into()
    }

    #[test]
    fn test_real_formula_follows_used_path() {
        let formula = nested();
        let real = formula.real_formula(&[0, 1, 1]).unwrap();
        assert_eq!(real.input_names().collect::<Vec<_>>(), vec!["c", "a"]);
        assert!(formula.real_formula(&[0, 1]).is_none());
        assert!(formula.real_formula(&[]).is_none());
        assert!(formula.real_formula(&[5]).is_none());
        assert!(leaf(&[]).real_formula(&[]).is_some());
    }

    #[test]
    fn test_input_names_cover_nested_formulas() {
        let names: Vec<String> = nested().input_names().into_iter().collect();
        assert_eq!(names, vec!["a", "b", "c", "main", "other"]);
    }

    #[test]
    fn test_empty_groups_rejected() {
        assert!(AlternativeFormulas::new(Vec::new()).is_err());
        assert!(SelectFormula::new(Vec::new()).is_err());
        assert!(SelectFormula::new(vec![("x".to_string(), leaf(&[])), ("x".to_string(), leaf(&[]))]).is_err());
    }

    #[test]
    fn test_describe_serializes() {
        let json = serde_json::to_value(nested().describe()).unwrap();
        assert_eq!(json["kind"], "select");
        assert_eq!(json["choices"][0]["main"], "main");
        assert_eq!(json["choices"][0]["formula"]["slices"][1]["formula"]["kind"], "alternatives");
    }
}
