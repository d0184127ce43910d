//! Build box pool
//!
//! The pool is fixed at startup. Scale-up works on a freshly shuffled copy
//! each cycle so the same boxes are not always favoured.

use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;

/// Errors building a pool
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("build box pool cannot be empty")]
    Empty,

    #[error("build box identifier cannot be blank")]
    BlankIdentifier,
}

/// Static set of build box identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    members: Vec<String>,
}

impl Pool {
    /// Builds a pool, dropping duplicate identifiers (first occurrence wins)
    pub fn new<I, S>(members: I) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for member in members {
            let member = member.into();
            let member = member.trim();
            if member.is_empty() {
                return Err(PoolError::BlankIdentifier);
            }
            if !unique.iter().any(|m| m == member) {
                unique.push(member.to_string());
            }
        }

        if unique.is_empty() {
            return Err(PoolError::Empty);
        }

        Ok(Self { members: unique })
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns a randomized ordering of the pool without touching it
    pub fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<String> {
        let mut order = self.members.clone();
        order.shuffle(rng);
        order
    }
}
