use colored::Colorize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Represents a node in the tree (either file or directory).
#[derive(Debug)]
struct TreeNode {
    name: String,
    children: Vec<Rc<RefCell<TreeNode>>>,
    is_file: bool,
}
impl TreeNode {
    fn new(name: String, is_file: bool) -> Self {
        Self {
            name,
            children: Vec::new(),
            is_file,
        }
    }
}

/// Build the directory tree of `files` below `root`, returning the root node.
///
/// Intermediate directories are created on the way; files outside `root`
/// are skipped.
fn build_tree(root: &Path, files: &[PathBuf]) -> Rc<RefCell<TreeNode>> {
    let root_name = root
        .file_name()
        .map(|os| os.to_string_lossy().to_string())
        .unwrap_or_else(|| root.display().to_string());

    let tree = Rc::new(RefCell::new(TreeNode::new(root_name, false)));

    // map full path to node
    let mut lookup: HashMap<PathBuf, Rc<RefCell<TreeNode>>> = HashMap::new();
    lookup.insert(root.to_path_buf(), Rc::clone(&tree));

    for file in files {
        let Ok(relative) = file.strip_prefix(root) else {
            log::debug!("{} is outside {}", file.display(), root.display());
            continue;
        };

        let mut parent = Rc::clone(&tree);
        let mut current = root.to_path_buf();
        let components: Vec<_> = relative.components().collect();

        for (i, component) in components.iter().enumerate() {
            current.push(component);
            let is_file = i == components.len() - 1;

            let node = match lookup.get(&current) {
                Some(node) => Rc::clone(node),
                None => {
                    let name = component.as_os_str().to_string_lossy().to_string();
                    let node = Rc::new(RefCell::new(TreeNode::new(name, is_file)));
                    parent.borrow_mut().children.push(Rc::clone(&node));
                    lookup.insert(current.clone(), Rc::clone(&node));
                    node
                }
            };
            parent = node;
        }
    }

    tree
}

fn render_node(node: &Rc<RefCell<TreeNode>>, prefix: &str, is_last: bool, out: &mut String) {
    let node_borrow = node.borrow();

    let connector = if is_last {
        "└── ".yellow()
    } else {
        "├── ".yellow()
    };
    let name = if node_borrow.is_file {
        node_borrow.name.green()
    } else {
        node_borrow.name.blue()
    };
    out.push_str(&format!("{}{}{}\n", prefix.yellow(), connector, name));

    let child_prefix = if is_last {
        format!("{}    ", prefix)
    } else {
        format!("{}│   ", prefix)
    };

    let len = node_borrow.children.len();
    for (i, child) in node_borrow.children.iter().enumerate() {
        render_node(child, &child_prefix, i == len - 1, out);
    }
}

/// Renders `files` as an ASCII tree rooted at `root`.
pub fn render_tree(root: &Path, files: &[PathBuf]) -> String {
    let tree = build_tree(root, files);

    let mut out = String::new();
    render_node(&tree, "", true, &mut out);
    out
}

pub fn preview_as_tree(root: &Path, files: &[PathBuf]) {
    println!(
        "Legend: {} = (directory), {} = (file)",
        "blue".blue(),
        "green".green()
    );

    println!(
        "{} {}\n",
        "┌─".bold().bright_blue(),
        "Preview".bold().bright_blue(),
    );

    print!("{}", render_tree(root, files));

    println!(
        "\n{} {}",
        "└─".bold().bright_blue(),
        format!("{} virtual files", files.len()).bright_green()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_tree_nests_directories() {
        colored::control::set_override(false);
        let root = Path::new("/base/dist");
        let files = vec![
            root.join("css.css"),
            root.join("js/hello.js"),
            root.join("js/main.js"),
        ];

        let rendered = render_tree(root, &files);

        assert_eq!(
            rendered,
            "└── dist\n    ├── css.css\n    └── js\n        ├── hello.js\n        └── main.js\n"
        );
    }
}
