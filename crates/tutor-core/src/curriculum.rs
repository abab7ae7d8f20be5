//! Curriculum graph: goals, their knowledge components and prerequisite
//! edges between goals.
//!
//! The graph is shared by all students and read-only from the point of view
//! of reconciliation. Whoever builds it must keep the goal graph acyclic;
//! [`would_create_cycle`] is the check the store runs before adding an edge.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// A curriculum standard, identified externally by a stable code such as
/// `"4.NBT.A.1"` and internally by `goal_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumGoal {
  pub goal_id:                    i64,
  pub code:                       String,
  pub title:                      String,
  pub subject:                    String,
  pub grade_level:                String,
  pub description:                Option<String>,
  /// Carried for reporting only; mastery aggregation is unweighted.
  pub recommended_hours_per_week: Option<f64>,
}

/// A skill inside a goal. `kc_code` is unique within its goal only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeComponent {
  pub goal_id:     i64,
  pub kc_code:     String,
  pub description: String,
}

/// A goal requires a KC from another goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prerequisite {
  pub goal_id:          i64,
  pub required_goal_id: i64,
  pub kc_code:          String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewKnowledgeComponent {
  pub kc_code:     String,
  pub description: String,
}

/// Input to [`crate::store::CurriculumGraph::add_goal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGoal {
  pub code:                       String,
  pub title:                      String,
  pub subject:                    String,
  pub grade_level:                String,
  #[serde(default)]
  pub description:                Option<String>,
  #[serde(default)]
  pub recommended_hours_per_week: Option<f64>,
  #[serde(default)]
  pub knowledge_components:       Vec<NewKnowledgeComponent>,
}

impl NewGoal {
  pub fn new(
    code: impl Into<String>,
    title: impl Into<String>,
    subject: impl Into<String>,
    grade_level: impl Into<String>,
  ) -> Self {
    Self {
      code: code.into(),
      title: title.into(),
      subject: subject.into(),
      grade_level: grade_level.into(),
      description: None,
      recommended_hours_per_week: None,
      knowledge_components: Vec::new(),
    }
  }

  pub fn with_kc(
    mut self,
    kc_code: impl Into<String>,
    description: impl Into<String>,
  ) -> Self {
    self.knowledge_components.push(NewKnowledgeComponent {
      kc_code:     kc_code.into(),
      description: description.into(),
    });
    self
  }
}

/// Canonical form of an externally supplied goal or KC code. Lookups are
/// additionally case-insensitive in the store.
pub fn normalize_code(code: &str) -> &str { code.trim() }

/// Would adding the edge `goal_id -> required_goal_id` close a cycle, given
/// the existing `(goal_id, required_goal_id)` edges?
///
/// A cycle exists if `goal_id` is already reachable from `required_goal_id`.
pub fn would_create_cycle(
  edges: &[(i64, i64)],
  goal_id: i64,
  required_goal_id: i64,
) -> bool {
  if goal_id == required_goal_id {
    return true;
  }

  let mut adjacency: HashMap<i64, Vec<i64>> = HashMap::new();
  for &(from, to) in edges {
    adjacency.entry(from).or_default().push(to);
  }

  let mut seen = HashSet::new();
  let mut stack = vec![required_goal_id];
  while let Some(node) = stack.pop() {
    if node == goal_id {
      return true;
    }
    if !seen.insert(node) {
      continue;
    }
    if let Some(next) = adjacency.get(&node) {
      stack.extend(next.iter().copied());
    }
  }
  false
}
