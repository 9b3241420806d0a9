//! Migration solver - orders actions so they can run one after another.
//!
//! The differ's output is a set: nothing in it says that `person` has to be
//! created after `company`, or that a foreign key has to go before the
//! column it sits on. This module turns the set into a sequence.
//!
//! ## Ordering
//!
//! Dependencies are pairwise rules between actions (see [`depends_on`]).
//! The sequence is produced by Kahn's algorithm, always taking the ready
//! action that came first in the input, so independent actions keep their
//! relative order and the output is reproducible.
//!
//! ## Foreign-key cycles
//!
//! ```text
//! -- This fails whichever way round it is written:
//! CREATE TABLE a (b_id INTEGER REFERENCES b (id), ...);
//! CREATE TABLE b (a_id INTEGER REFERENCES a (id), ...);
//!
//! -- This works:
//! CREATE TABLE a (b_id INTEGER, ...);
//! CREATE TABLE b (a_id INTEGER REFERENCES a (id), ...);
//! ALTER TABLE a ADD CONSTRAINT ... FOREIGN KEY (b_id) REFERENCES b (id);
//! ```
//!
//! Each strongly connected group of CREATEs is broken at the table whose
//! name sorts first: it is created without the keys pointing into the
//! group, and those keys are added once every CREATE of the group has run.
//! Tables being dropped are handled the same way in reverse, by dropping
//! the keys first.

use std::collections::{BTreeSet, HashSet};
use strata_db_schema::{Action, ForeignKey, Table};

/// Order `actions` for sequential execution.
///
/// Never fails: foreign-key cycles are broken by deferring keys, and a
/// cycle that cannot be broken is logged and appended in input order.
pub fn order_actions(actions: Vec<Action>) -> Vec<Action> {
    let mut graph = Graph::new(actions);
    while let Some(component) = graph.first_cycle() {
        if !graph.break_cycle(&component) {
            break;
        }
    }
    graph.into_sorted()
}

/// Whether `action` has to run after `other`.
pub fn depends_on(action: &Action, other: &Action) -> bool {
    match (action, other) {
        (Action::Create(t), Action::Create(f)) => references(t, &f.name),
        (
            Action::Create(t),
            Action::AddColumn { table, field } | Action::ChangeColumn { table, to: field, .. },
        ) => {
            *table != t.name
                && t
                    .foreign_keys
                    .iter()
                    .any(|fk| fk.foreign_table == *table && fk.foreign_field == field.name)
        }

        (Action::Drop(f), Action::Drop(t)) => references(t, &f.name),
        (Action::Drop(t), Action::DropKey(fk)) => fk.involves(&t.name),
        (
            Action::Drop(t),
            Action::DropColumn { table, .. } | Action::ChangeColumn { table, .. },
        ) => *table == t.name,

        (Action::DropColumn { table, field }, Action::DropKey(fk)) => {
            fk.touches(table, &field.name)
        }
        (Action::DropColumn { table, field }, Action::DropIndex(index)) => {
            index.table == *table && index.field == field.name
        }

        (Action::ChangeColumn { table, to, .. }, Action::DropKey(fk)) => fk.touches(table, &to.name),
        (Action::ChangeColumn { table, .. }, Action::DropColumn { table: other, .. }) => {
            table == other
        }

        (Action::AddColumn { table, .. }, Action::Create(t)) => *table == t.name,

        (Action::AddKey(fk), Action::Create(t)) => fk.involves(&t.name),
        (
            Action::AddKey(fk),
            Action::AddColumn { table, field } | Action::ChangeColumn { table, to: field, .. },
        ) => fk.touches(table, &field.name),
        (Action::AddKey(fk), Action::DropKey(old)) => {
            fk.domestic_table == old.domestic_table && fk.field == old.field
        }

        (Action::CreateIndex(index), Action::Create(t)) => index.table == t.name,
        (
            Action::CreateIndex(index),
            Action::AddColumn { table, field } | Action::ChangeColumn { table, to: field, .. },
        ) => index.table == *table && index.field == field.name,
        (Action::CreateIndex(index), Action::DropIndex(old)) => index.name() == old.name(),

        _ => false,
    }
}

/// Whether `table` holds a key into another table called `target`.
fn references(table: &Table, target: &str) -> bool {
    table.name != target && table.foreign_keys.iter().any(|fk| fk.foreign_table == target)
}

struct Graph {
    actions: Vec<Action>,
    /// `(before, after)` pairs added while breaking cycles.
    extra: Vec<(usize, usize)>,
}

impl Graph {
    fn new(actions: Vec<Action>) -> Self {
        Self {
            actions,
            extra: Vec::new(),
        }
    }

    /// `successors[i]` lists the actions waiting on action `i`.
    fn successors(&self) -> Vec<Vec<usize>> {
        let n = self.actions.len();
        let mut successors = vec![Vec::new(); n];
        for (after, action) in self.actions.iter().enumerate() {
            for (before, other) in self.actions.iter().enumerate() {
                if before != after && depends_on(action, other) {
                    successors[before].push(after);
                }
            }
        }
        for &(before, after) in &self.extra {
            if !successors[before].contains(&after) {
                successors[before].push(after);
            }
        }
        successors
    }

    /// The strongly connected component with the lowest member index, if any
    /// component has more than one member.
    fn first_cycle(&self) -> Option<Vec<usize>> {
        let mut components = tarjan(&self.successors());
        components.retain(|c| c.len() > 1);
        components.into_iter().min_by_key(|c| c.first().copied())
    }

    /// Defer the keys of one table in the component. Returns false when the
    /// component holds no key that can be deferred.
    fn break_cycle(&mut self, component: &[usize]) -> bool {
        self.break_creates(component) || self.break_drops(component)
    }

    fn break_creates(&mut self, component: &[usize]) -> bool {
        let creates: Vec<usize> = component
            .iter()
            .copied()
            .filter(|&i| matches!(self.actions[i], Action::Create(_)))
            .collect();
        let Some((victim, deferred)) = self.victim(&creates) else {
            return false;
        };
        let Action::Create(table) = &self.actions[victim] else {
            return false;
        };

        tracing::info!(
            table = %table.name,
            keys = %display_keys(&deferred),
            "breaking foreign-key cycle between new tables"
        );
        let stripped = table.without_foreign_keys(&deferred);
        self.actions[victim] = Action::Create(stripped);
        for fk in deferred {
            let add = self.actions.len();
            self.actions.push(Action::AddKey(fk));
            self.extra.extend(creates.iter().map(|&create| (create, add)));
        }
        true
    }

    fn break_drops(&mut self, component: &[usize]) -> bool {
        let drops: Vec<usize> = component
            .iter()
            .copied()
            .filter(|&i| matches!(self.actions[i], Action::Drop(_)))
            .collect();
        let Some((victim, deferred)) = self.victim(&drops) else {
            return false;
        };
        let Action::Drop(table) = &self.actions[victim] else {
            return false;
        };

        tracing::info!(
            table = %table.name,
            keys = %display_keys(&deferred),
            "breaking foreign-key cycle between dropped tables"
        );
        let stripped = table.without_foreign_keys(&deferred);
        self.actions[victim] = Action::Drop(stripped);
        self.actions.extend(deferred.into_iter().map(Action::DropKey));
        true
    }

    /// Among the tables carried by `members`, the one whose name sorts first
    /// and that has keys into the others, with those keys.
    fn victim(&self, members: &[usize]) -> Option<(usize, Vec<ForeignKey>)> {
        let tables: Vec<(usize, &Table)> = members
            .iter()
            .filter_map(|&i| match &self.actions[i] {
                Action::Create(t) | Action::Drop(t) => Some((i, t)),
                _ => None,
            })
            .collect();
        let names: HashSet<&str> = tables.iter().map(|(_, t)| t.name.as_str()).collect();

        let mut candidates: Vec<(usize, &Table, Vec<ForeignKey>)> = tables
            .iter()
            .map(|&(i, t)| {
                let keys = t
                    .foreign_keys
                    .iter()
                    .filter(|fk| !fk.is_self_reference() && names.contains(fk.foreign_table.as_str()))
                    .cloned()
                    .collect::<Vec<_>>();
                (i, t, keys)
            })
            .filter(|(_, _, keys)| !keys.is_empty())
            .collect();
        candidates.sort_by(|a, b| a.1.name.cmp(&b.1.name));
        candidates
            .into_iter()
            .next()
            .map(|(i, _, keys)| (i, keys))
    }

    /// Kahn's algorithm, lowest ready index first.
    fn into_sorted(self) -> Vec<Action> {
        let successors = self.successors();
        let mut in_degree = vec![0usize; self.actions.len()];
        for next in successors.iter().flatten() {
            in_degree[*next] += 1;
        }

        let mut ready: BTreeSet<usize> = (0..self.actions.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.actions.len());
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &next in &successors[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < self.actions.len() {
            let scheduled: HashSet<usize> = order.iter().copied().collect();
            let stuck: Vec<usize> = (0..self.actions.len())
                .filter(|i| !scheduled.contains(i))
                .collect();
            let listing = stuck
                .iter()
                .map(|&i| self.actions[i].to_string())
                .collect::<Vec<_>>()
                .join("; ");
            tracing::error!(
                actions = %listing,
                "unresolvable dependency cycle, appending remaining actions in input order"
            );
            order.extend(stuck);
        }

        let mut slots: Vec<Option<Action>> = self.actions.into_iter().map(Some).collect();
        order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect()
    }
}

fn display_keys(keys: &[ForeignKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Tarjan's strongly connected components. Members of each component are
/// returned in ascending index order.
fn tarjan(successors: &[Vec<usize>]) -> Vec<Vec<usize>> {
    struct State<'a> {
        successors: &'a [Vec<usize>],
        index: Vec<Option<usize>>,
        low: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        next: usize,
        components: Vec<Vec<usize>>,
    }

    impl State<'_> {
        fn visit(&mut self, v: usize) {
            self.index[v] = Some(self.next);
            self.low[v] = self.next;
            self.next += 1;
            self.stack.push(v);
            self.on_stack[v] = true;

            let successors = self.successors;
            for &w in &successors[v] {
                match self.index[w] {
                    None => {
                        self.visit(w);
                        self.low[v] = self.low[v].min(self.low[w]);
                    }
                    Some(index) if self.on_stack[w] => {
                        self.low[v] = self.low[v].min(index);
                    }
                    Some(_) => {}
                }
            }

            if Some(self.low[v]) == self.index[v] {
                let mut component = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                component.sort_unstable();
                self.components.push(component);
            }
        }
    }

    let n = successors.len();
    let mut state = State {
        successors,
        index: vec![None; n],
        low: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        next: 0,
        components: Vec::new(),
    };
    for v in 0..n {
        if state.index[v].is_none() {
            state.visit(v);
        }
    }
    state.components
}
