//! Dependency graph export and formula descriptions.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::CalcResult;
use crate::rules::RuleSet;
use crate::time::Instant;

/// A variable in a dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Variable name.
    pub name: String,
    /// Entity key of the variable.
    pub entity: String,
    /// Human-readable label, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// The variable has no formula and is only ever set as input.
    pub is_input: bool,
}

/// `from` is read by the formula of `to`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Consumed variable.
    pub from: String,
    /// Consuming variable.
    pub to: String,
}

/// Variables a variable transitively depends on, and the edges between them.
///
/// The main variables of a selection count as dependencies: they are
/// evaluated to pick the formula, so each gets an edge to the selecting
/// variable alongside the inputs of its formulas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// Nodes in discovery order, root first.
    pub nodes: Vec<GraphNode>,
    /// Edges in discovery order.
    pub edges: Vec<GraphEdge>,
}

impl DependencyGraph {
    /// Builds the graph rooted at `name`, walking every candidate of grouped
    /// formulas and visiting each variable once.
    ///
    /// # Errors
    ///
    /// Returns `EvaluationError::UnknownVariable` if `name` or one of its
    /// dependencies is not defined.
    pub fn build(rules: &RuleSet, name: &str) -> CalcResult<Self> {
        let mut graph = Self::default();
        let mut visited = BTreeSet::new();
        graph.visit(rules, name, &mut visited)?;
        Ok(graph)
    }

    fn visit(&mut self, rules: &RuleSet, name: &str, visited: &mut BTreeSet<String>) -> CalcResult<()> {
        if !visited.insert(name.to_string()) {
            return Ok(());
        }
        let variable = rules.variable(name)?;
        self.nodes.push(GraphNode {
            name: variable.name().to_string(),
            entity: variable.entity().to_string(),
            label: variable.label().map(str::to_string),
            is_input: variable.is_input(),
        });
        let Some(formula) = variable.formula() else {
            return Ok(());
        };
        for input in formula.input_names() {
            self.edges.push(GraphEdge {
                from: input.clone(),
                to: name.to_string(),
            });
            self.visit(rules, &input, visited)?;
        }
        Ok(())
    }

    /// Names of the nodes.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.name.as_str())
    }
}

/// A declared input of a direct formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDescription {
    /// Input variable.
    pub name: String,
    /// Period rule the input is read with.
    pub period: String,
}

/// A slice of a time-sliced formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceDescription {
    pub start: Instant,
    pub stop: Instant,
    pub formula: FormulaDescription,
}

/// A choice of a selected formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceDescription {
    /// Main variable whose presence selects `formula`.
    pub main: String,
    pub formula: FormulaDescription,
}

/// Serializable shape of a formula tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormulaDescription {
    /// A direct formula.
    Direct {
        /// Inputs in declaration order.
        inputs: Vec<InputDescription>,
        /// Parameter name to legislation path.
        parameters: BTreeMap<String, String>,
        /// Output-period rule.
        output_period: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    /// Prioritized alternatives.
    Alternatives {
        /// Candidates in priority order.
        candidates: Vec<FormulaDescription>,
    },
    /// Time-sliced formulas.
    Dated {
        /// Slices sorted by start.
        slices: Vec<SliceDescription>,
    },
    /// Formulas selected by main input.
    Select {
        /// Choices in probing order.
        choices: Vec<ChoiceDescription>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{DirectFormula, SelectFormula};
    use crate::variable::VariableBuilder;

    fn copy_of(input: &str) -> DirectFormula {
        let name = input.to_string();
        DirectFormula::builder(move |ctx| Ok(ctx.input(&name)?.clone()))
            .input(input)
            .build()
            .unwrap()
    }

    #[test]
    fn test_select_main_variables_are_edges() {
        let select = SelectFormula::new(vec![
            ("declared".to_string(), copy_of("salary").into()),
            ("estimated".to_string(), copy_of("estimated").into()),
        ])
        .unwrap();
        let rules = RuleSet::builder("graph")
            .variable(VariableBuilder::new("declared", "person").build().unwrap())
            .variable(VariableBuilder::new("estimated", "person").build().unwrap())
            .variable(VariableBuilder::new("salary", "person").build().unwrap())
            .variable(VariableBuilder::new("income", "person").formula(select).build().unwrap())
            .build()
            .unwrap();

        let graph = DependencyGraph::build(&rules, "income").unwrap();
        let mut edges: Vec<(&str, &str)> = graph
            .edges
            .iter()
            .map(|edge| (edge.from.as_str(), edge.to.as_str()))
            .collect();
        edges.sort_unstable();
        assert_eq!(
            edges,
            vec![("declared", "income"), ("estimated", "income"), ("salary", "income")]
        );
        assert_eq!(graph.nodes.len(), 4);
        assert!(graph.nodes.iter().skip(1).all(|node| node.is_input));
    }

    #[test]
    fn test_unknown_root_is_rejected() {
        let rules = RuleSet::builder("empty").build().unwrap();
        assert!(DependencyGraph::build(&rules, "missing").is_err());
    }
}
