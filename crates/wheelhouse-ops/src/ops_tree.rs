//! Operation: display per-target dependency trees of a resolved closure.

use wheelhouse_resolver::Closure;

/// Options for [`render_trees`].
#[derive(Debug, Default, Clone)]
pub struct TreeOptions {
    /// Maximum tree depth to display.
    pub depth: Option<usize>,
    /// Show the chain of packages that pulls this one in.
    pub why: Option<String>,
    /// Show dependents of `why` instead of the path to it.
    pub inverted: bool,
}

/// Render one section per target.
pub fn render_trees(closure: &Closure, opts: &TreeOptions) -> String {
    let mut output = String::new();
    for (i, (target, resolved)) in closure.iter().enumerate() {
        if i > 0 {
            output.push('\n');
        }
        let graph = &resolved.graph;
        match &opts.why {
            Some(name) if opts.inverted => {
                let inverted = graph.print_inverted_tree(name);
                if inverted.is_empty() {
                    output.push_str(&format!("{target}: `{name}` is not in the closure\n"));
                } else {
                    output.push_str(&format!("{target}:\n{inverted}"));
                }
            }
            Some(name) => match graph.find_path(name) {
                Some(path) => {
                    output.push_str(&format!("{target}: path to {name}\n"));
                    for (depth, node) in path.iter().enumerate().skip(1) {
                        output.push_str(&format!("{}{node}\n", "  ".repeat(depth)));
                    }
                }
                None => output.push_str(&format!("{target}: `{name}` is not in the closure\n")),
            },
            None => output.push_str(&graph.print_tree(opts.depth)),
        }
    }
    output
}
