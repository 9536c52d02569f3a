//! Role scatter/gather between individuals and group entities.
//!
//! Every individual belongs to exactly one row of a group entity (a household,
//! a tax unit, ...) and holds a small integer role in it (0 is the reference
//! member). These transforms move columns between the individual level and
//! the group level. All of them are O(population) and reject inputs whose
//! length does not match the level they are read at.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::error::ContractViolation;

/// Role code of an individual inside its group.
pub type Role = u32;

/// Minimum number of role slots produced by a split with no explicit roles.
pub const MIN_SPLIT_ROLES: Role = 11;

/// Group row and role of every individual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleIndex {
    group_rows: Vec<usize>,
    roles: Vec<Role>,
    group_count: usize,
}

impl RoleIndex {
    /// Creates an index over `group_count` groups.
    ///
    /// # Errors
    ///
    /// Returns `ContractViolation::ShapeMismatch` if the two per-individual
    /// arrays differ in length or a group row is out of range.
    pub fn new(group_rows: Vec<usize>, roles: Vec<Role>, group_count: usize) -> Result<Self, ContractViolation> {
        if group_rows.len() != roles.len() {
            return Err(ContractViolation::ShapeMismatch {
                context: "role codes".to_string(),
                expected: group_rows.len(),
                actual: roles.len(),
            });
        }
        if let Some(&row) = group_rows.iter().find(|&&row| row >= group_count) {
            return Err(ContractViolation::ShapeMismatch {
                context: format!("group row {row} of role index"),
                expected: group_count,
                actual: row + 1,
            });
        }
        Ok(Self {
            group_rows,
            roles,
            group_count,
        })
    }

    pub fn person_count(&self) -> usize {
        self.group_rows.len()
    }

    pub fn group_count(&self) -> usize {
        self.group_count
    }

    pub fn group_rows(&self) -> &[usize] {
        &self.group_rows
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    fn check_persons(&self, len: usize, context: &str) -> Result<(), ContractViolation> {
        if len == self.person_count() {
            Ok(())
        } else {
            Err(ContractViolation::ShapeMismatch {
                context: format!("{context} (individuals)"),
                expected: self.person_count(),
                actual: len,
            })
        }
    }

    fn check_groups(&self, len: usize, context: &str) -> Result<(), ContractViolation> {
        if len == self.group_count {
            Ok(())
        } else {
            Err(ContractViolation::ShapeMismatch {
                context: format!("{context} (groups)"),
                expected: self.group_count,
                actual: len,
            })
        }
    }

    /// Iterates `(individual, group_row)` for individuals whose role is in `roles`.
    fn selected<'a>(&'a self, roles: &'a [Role]) -> impl Iterator<Item = (usize, usize)> + 'a {
        let selection = RoleSelection::new(roles);
        self.roles
            .iter()
            .zip(&self.group_rows)
            .enumerate()
            .filter(move |(_, (role, _))| selection.contains(**role))
            .map(|(person, (_, &row))| (person, row))
    }

    /// Broadcasts group values to the individuals holding one of `roles`;
    /// other individuals get `default`.
    ///
    /// # Errors
    ///
    /// Returns `ContractViolation::ShapeMismatch` if `group_values` does not
    /// have one value per group.
    pub fn cast_to_roles<T: Copy>(&self, group_values: &[T], roles: &[Role], default: T) -> Result<Vec<T>, ContractViolation> {
        self.check_groups(group_values.len(), "cast_to_roles")?;
        let mut out = vec![default; self.person_count()];
        for (person, row) in self.selected(roles) {
            out[person] = group_values[row];
        }
        Ok(out)
    }

    /// Collects, per group, the value of the individual holding `role`;
    /// groups without such an individual get `default`.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` on a length mismatch and `DuplicateRole` when
    /// two individuals of one group hold `role`.
    pub fn gather_from_role<T: Copy>(&self, person_values: &[T], role: Role, default: T) -> Result<Vec<T>, ContractViolation> {
        self.check_persons(person_values.len(), "gather_from_role")?;
        let mut out = vec![default; self.group_count];
        let mut seen = vec![false; self.group_count];
        for (person, row) in self.selected(&[role]) {
            if seen[row] {
                return Err(ContractViolation::DuplicateRole { group_row: row, role });
            }
            seen[row] = true;
            out[row] = person_values[person];
        }
        Ok(out)
    }

    /// Applies [`gather_from_role`](Self::gather_from_role) for each of `roles`.
    ///
    /// # Errors
    ///
    /// Same as `gather_from_role`.
    pub fn split_by_role<T: Copy>(
        &self,
        person_values: &[T],
        roles: &[Role],
        default: T,
    ) -> Result<BTreeMap<Role, Vec<T>>, ContractViolation> {
        roles
            .iter()
            .map(|&role| Ok((role, self.gather_from_role(person_values, role, default)?)))
            .collect()
    }

    /// Sums, per group, the values of individuals whose role is in `roles`.
    ///
    /// # Errors
    ///
    /// Returns `ContractViolation::ShapeMismatch` on a length mismatch.
    pub fn reduce_sum_by_group<T>(&self, person_values: &[T], roles: &[Role]) -> Result<Vec<T>, ContractViolation>
    where
        T: Copy + Default + AddAssign,
    {
        self.check_persons(person_values.len(), "reduce_sum_by_group")?;
        let mut out = vec![T::default(); self.group_count];
        for (person, row) in self.selected(roles) {
            out[row] += person_values[person];
        }
        Ok(out)
    }

    /// Logical OR, per group, over individuals whose role is in `roles`.
    ///
    /// # Errors
    ///
    /// Returns `ContractViolation::ShapeMismatch` on a length mismatch.
    pub fn reduce_any_by_group(&self, person_values: &[bool], roles: &[Role]) -> Result<Vec<bool>, ContractViolation> {
        self.check_persons(person_values.len(), "reduce_any_by_group")?;
        let mut out = vec![false; self.group_count];
        for (person, row) in self.selected(roles) {
            out[row] |= person_values[person];
        }
        Ok(out)
    }
}

/// Role membership test; sized by the number of roles, not their values.
enum RoleSelection<'a> {
    Few(&'a [Role]),
    Many(BTreeSet<Role>),
}

impl<'a> RoleSelection<'a> {
    const LINEAR_SCAN_MAX: usize = 8;

    fn new(roles: &'a [Role]) -> Self {
        if roles.len() <= Self::LINEAR_SCAN_MAX {
            Self::Few(roles)
        } else {
            Self::Many(roles.iter().copied().collect())
        }
    }

    fn contains(&self, role: Role) -> bool {
        match self {
            Self::Few(roles) => roles.contains(&role),
            Self::Many(roles) => roles.contains(&role),
        }
    }
}
