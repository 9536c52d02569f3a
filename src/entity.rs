//! Entity populations.
//!
//! A simulation runs over one population of individuals and any number of
//! group entities built from them. Variables are attached to one entity kind
//! by key and hold one element per member of that entity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CalcResult, ContractViolation, EvaluationError};
use crate::roles::{Role, RoleIndex, MIN_SPLIT_ROLES};
use crate::value::{Array, Value};

/// A group entity (household, tax unit, ...) and the membership of every
/// individual in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntity {
    key: String,
    roles_count: Role,
    index: RoleIndex,
}

impl GroupEntity {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn count(&self) -> usize {
        self.index.group_count()
    }

    pub fn roles_count(&self) -> Role {
        self.roles_count
    }

    pub fn index(&self) -> &RoleIndex {
        &self.index
    }

    fn all_roles(&self) -> Vec<Role> {
        (0..self.roles_count).collect()
    }

    fn check_roles(&self, roles: &[Role]) -> Result<(), ContractViolation> {
        match roles.iter().find(|&&role| role >= self.roles_count) {
            Some(&role) => Err(ContractViolation::UnknownRole {
                entity: self.key.clone(),
                role,
                roles_count: self.roles_count,
            }),
            None => Ok(()),
        }
    }

    fn resolve_roles(&self, roles: Option<&[Role]>) -> Result<Vec<Role>, ContractViolation> {
        match roles {
            Some(roles) => {
                self.check_roles(roles)?;
                Ok(roles.to_vec())
            }
            None => Ok(self.all_roles()),
        }
    }

    /// Sums a persons column per group over `roles` (all roles when `None`).
    /// Booleans are widened to integers.
    ///
    /// # Errors
    ///
    /// Returns a contract violation on a length mismatch or unknown role.
    pub fn sum_by_entity(&self, persons: &Array, roles: Option<&[Role]>) -> CalcResult<Array> {
        let roles = self.resolve_roles(roles)?;
        let out = match persons {
            Array::Float(v) => Array::Float(self.index.reduce_sum_by_group(v, &roles)?),
            Array::Int(v) => Array::Int(self.index.reduce_sum_by_group(v, &roles)?),
            Array::Bool(v) => {
                let widened: Vec<i64> = v.iter().map(|&b| i64::from(b)).collect();
                Array::Int(self.index.reduce_sum_by_group(&widened, &roles)?)
            }
        };
        Ok(out)
    }

    /// True for groups where at least one member with a role in `roles`
    /// holds a non-zero value.
    ///
    /// # Errors
    ///
    /// Returns a contract violation on a length mismatch or unknown role.
    pub fn any_by_roles(&self, persons: &Array, roles: Option<&[Role]>) -> CalcResult<Array> {
        let roles = self.resolve_roles(roles)?;
        let flags: Vec<bool> = match persons {
            Array::Bool(v) => v.clone(),
            Array::Int(v) => v.iter().map(|&x| x != 0).collect(),
            Array::Float(v) => v.iter().map(|&x| x != 0.0).collect(),
        };
        Ok(Array::Bool(self.index.reduce_any_by_group(&flags, &roles)?))
    }

    /// Broadcasts a group column to the members holding one of `roles`
    /// (every member when `None`); others get `default`.
    ///
    /// # Errors
    ///
    /// Returns a contract violation on a length mismatch or unknown role.
    pub fn cast_from_entity_to_roles(&self, groups: &Array, roles: Option<&[Role]>, default: Value) -> CalcResult<Array> {
        let roles = self.resolve_roles(roles)?;
        let out = match groups {
            Array::Float(v) => Array::Float(self.index.cast_to_roles(v, &roles, default.as_f64())?),
            Array::Int(v) => Array::Int(self.index.cast_to_roles(v, &roles, default.as_i64())?),
            Array::Bool(v) => Array::Bool(self.index.cast_to_roles(v, &roles, default.as_bool())?),
        };
        Ok(out)
    }

    /// Group column holding the value of the member with `role`.
    ///
    /// # Errors
    ///
    /// Returns a contract violation on a length mismatch, unknown role or two
    /// members sharing `role` in one group.
    pub fn filter_role(&self, persons: &Array, role: Role, default: Value) -> CalcResult<Array> {
        self.check_roles(&[role])?;
        gather(&self.index, persons, role, default)
    }

    /// One group column per role. With `None`, spans at least
    /// [`MIN_SPLIT_ROLES`] role slots.
    ///
    /// # Errors
    ///
    /// Same as [`filter_role`](Self::filter_role).
    pub fn split_by_roles(&self, persons: &Array, roles: Option<&[Role]>, default: Value) -> CalcResult<BTreeMap<Role, Array>> {
        let roles = match roles {
            Some(roles) => {
                self.check_roles(roles)?;
                roles.to_vec()
            }
            None => (0..self.roles_count.max(MIN_SPLIT_ROLES)).collect(),
        };
        roles
            .into_iter()
            .map(|role| Ok((role, gather(&self.index, persons, role, default)?)))
            .collect()
    }
}

fn gather(index: &RoleIndex, persons: &Array, role: Role, default: Value) -> CalcResult<Array> {
    let out = match persons {
        Array::Float(v) => Array::Float(index.gather_from_role(v, role, default.as_f64())?),
        Array::Int(v) => Array::Int(index.gather_from_role(v, role, default.as_i64())?),
        Array::Bool(v) => Array::Bool(index.gather_from_role(v, role, default.as_bool())?),
    };
    Ok(out)
}

/// The individuals of a simulation and the group entities built from them.
///
/// # Examples
///
/// ```
/// use legiscalc::Population;
///
/// let population = Population::new("person", 3)
///     .with_group("household", 2, vec![0, 0, 1], vec![0, 1, 0], 2)
///     .unwrap();
/// assert_eq!(population.count("household").unwrap(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Population {
    person_key: String,
    person_count: usize,
    groups: BTreeMap<String, GroupEntity>,
}

impl Population {
    #[must_use]
    pub fn new(person_key: impl Into<String>, person_count: usize) -> Self {
        Self {
            person_key: person_key.into(),
            person_count,
            groups: BTreeMap::new(),
        }
    }

    /// Adds a group entity of `group_count` rows.
    ///
    /// # Errors
    ///
    /// Returns a contract violation if the index does not cover every
    /// individual, a row is out of range or a role code is not below
    /// `roles_count`.
    pub fn with_group(
        mut self,
        key: impl Into<String>,
        roles_count: Role,
        group_rows: Vec<usize>,
        roles: Vec<Role>,
        group_count: usize,
    ) -> CalcResult<Self> {
        let key = key.into();
        if group_rows.len() != self.person_count {
            return Err(ContractViolation::ShapeMismatch {
                context: format!("membership of group entity '{key}'"),
                expected: self.person_count,
                actual: group_rows.len(),
            }
            .into());
        }
        if let Some(&role) = roles.iter().find(|&&role| role >= roles_count) {
            return Err(ContractViolation::UnknownRole {
                entity: key,
                role,
                roles_count,
            }
            .into());
        }
        let index = RoleIndex::new(group_rows, roles, group_count)?;
        self.groups.insert(
            key.clone(),
            GroupEntity {
                key,
                roles_count,
                index,
            },
        );
        Ok(self)
    }

    pub fn person_key(&self) -> &str {
        &self.person_key
    }

    pub fn person_count(&self) -> usize {
        self.person_count
    }

    #[must_use]
    pub fn is_person_entity(&self, key: &str) -> bool {
        key == self.person_key
    }

    /// Number of members of entity `key`.
    ///
    /// # Errors
    ///
    /// Returns `EvaluationError::UnknownEntity` for an unknown key.
    pub fn count(&self, key: &str) -> CalcResult<usize> {
        if self.is_person_entity(key) {
            return Ok(self.person_count);
        }
        Ok(self.group(key)?.count())
    }

    /// The group entity `key`.
    ///
    /// # Errors
    ///
    /// Returns `NotAGroupEntity` for the person entity and `UnknownEntity`
    /// for an unknown key.
    pub fn group(&self, key: &str) -> CalcResult<&GroupEntity> {
        if self.is_person_entity(key) {
            return Err(ContractViolation::NotAGroupEntity { entity: key.to_string() }.into());
        }
        self.groups
            .get(key)
            .ok_or_else(|| EvaluationError::UnknownEntity { key: key.to_string() }.into())
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupEntity> {
        self.groups.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CalcError;

    fn population() -> Population {
        Population::new("person", 5)
            .with_group("household", 3, vec![0, 0, 1, 1, 1], vec![0, 2, 0, 1, 2], 2)
            .unwrap()
    }

    #[test]
    fn test_counts() {
        let p = population();
        assert_eq!(p.count("person").unwrap(), 5);
        assert_eq!(p.count("household").unwrap(), 2);
        assert!(matches!(
            p.count("family"),
            Err(CalcError::Evaluation(EvaluationError::UnknownEntity { .. }))
        ));
        assert!(p.group("person").is_err());
    }

    #[test]
    fn test_with_group_validates() {
        assert!(Population::new("person", 2)
            .with_group("household", 1, vec![0], vec![0], 1)
            .is_err());
        assert!(Population::new("person", 2)
            .with_group("household", 1, vec![0, 0], vec![0, 1], 1)
            .is_err());
    }

    #[test]
    fn test_sum_widens_booleans() {
        let p = population();
        let household = p.group("household").unwrap();
        let out = household
            .sum_by_entity(&Array::Bool(vec![true, true, false, true, true]), None)
            .unwrap();
        assert_eq!(out, Array::Int(vec![2, 2]));
    }

    #[test]
    fn test_any_by_roles() {
        let p = population();
        let household = p.group("household").unwrap();
        let out = household
            .any_by_roles(&Array::Float(vec![0.0, 0.0, 0.0, 0.0, 3.0]), Some(&[2]))
            .unwrap();
        assert_eq!(out, Array::Bool(vec![false, true]));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let p = population();
        let household = p.group("household").unwrap();
        let err = household
            .filter_role(&Array::Int(vec![0; 5]), 7, Value::Int(0))
            .unwrap_err();
        assert!(matches!(
            err.as_contract_violation(),
            Some(ContractViolation::UnknownRole { role: 7, .. })
        ));
    }

    #[test]
    fn test_split_spans_minimum_role_slots() {
        let p = population();
        let household = p.group("household").unwrap();
        let split = household
            .split_by_roles(&Array::Int(vec![1, 2, 3, 4, 5]), None, Value::Int(0))
            .unwrap();
        assert_eq!(split.len(), MIN_SPLIT_ROLES as usize);
        assert_eq!(split[&1], Array::Int(vec![0, 4]));
        assert_eq!(split[&10], Array::Int(vec![0, 0]));
    }

    #[test]
    fn test_cast_from_entity_to_roles() {
        let p = population();
        let household = p.group("household").unwrap();
        let out = household
            .cast_from_entity_to_roles(&Array::Float(vec![100.0, 200.0]), None, Value::Float(0.0))
            .unwrap();
        assert_eq!(out, Array::Float(vec![100.0, 100.0, 200.0, 200.0, 200.0]));
    }
}
