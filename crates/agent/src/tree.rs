//! Read-only inspection of a composed agent tree.

use std::fmt::Write;

use tandem_core::Agent;

/// Visit `root` and every descendant in pre-order, depth-first.
/// `visit` receives the depth (root is 0) and the agent.
pub fn walk<'a>(root: &'a dyn Agent, visit: &mut dyn FnMut(usize, &'a dyn Agent)) {
    walk_at(root, 0, visit);
}

fn walk_at<'a>(agent: &'a dyn Agent, depth: usize, visit: &mut dyn FnMut(usize, &'a dyn Agent)) {
    visit(depth, agent);
    for child in agent.children() {
        walk_at(child.as_ref(), depth + 1, visit);
    }
}

/// First agent in pre-order whose id is `id`. Ids are not required to be
/// unique, so later matches are not reachable through this.
pub fn find<'a>(root: &'a dyn Agent, id: &str) -> Option<&'a dyn Agent> {
    if root.id() == id {
        return Some(root);
    }
    root.children()
        .iter()
        .find_map(|child| find(child.as_ref(), id))
}

/// Indented listing of ids, one per line, for diagnostics.
///
/// ```text
/// pipeline (2 children)
///   draft
///   review (3 children)
///     style
///     facts
///     tone
/// ```
pub fn render(root: &dyn Agent) -> String {
    let mut out = String::new();
    walk(root, &mut |depth, agent| {
        let indent = "  ".repeat(depth);
        let _ = match agent.children().len() {
            0 => writeln!(out, "{indent}{}", agent.id()),
            1 => writeln!(out, "{indent}{} (1 child)", agent.id()),
            n => writeln!(out, "{indent}{} ({n} children)", agent.id()),
        };
    });
    out
}
