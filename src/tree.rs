//! Rooted, leaf-labelled trees parsed from Newick strings.
//!
//! Nodes live in an arena and are addressed by [NodeId]. Every node stores
//! its optional name and its parent; the children lists are a reverse index
//! built once after parsing. Trees are never mutated after construction.

use crate::error::{Result, ScoreError};
use rustc_hash::{FxHashMap, FxHashSet};
use std::str::FromStr;

/// Index of a node in a [Tree].
pub type NodeId = usize;

#[derive(Debug, Clone)]
struct Node {
    name: Option<String>,
    parent: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    children: Vec<Vec<NodeId>>,
    root: NodeId,
}

impl Tree {
    /// Parses a single Newick tree, e.g. `((A:1,B:1)AB:1,C:2)root;`.
    ///
    /// Quoted labels (`'a label'`, with `''` as an escaped quote) and
    /// bracketed comments are accepted. Branch lengths are validated but not
    /// kept. The terminating `;` may be omitted at the end of the input.
    pub fn parse(newick: &str) -> Result<Self> {
        NewickReader::new(newick).read()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.children[id]
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.children[id].is_empty()
    }

    pub fn has_name(&self, id: NodeId) -> bool {
        self.nodes[id].name.is_some()
    }

    /// Name of a node, failing for unnamed nodes.
    pub fn name(&self, id: NodeId) -> Result<&str> {
        self.nodes[id]
            .name
            .as_deref()
            .ok_or(ScoreError::UnnamedNode(id))
    }

    /// Every node exactly once, each after all of its descendants.
    pub fn post_order(&self) -> PostOrderIter<'_> {
        PostOrderIter {
            tree: self,
            stack: vec![(self.root, false)],
        }
    }

    /// Maps every named node to its id. If a name occurs more than once the
    /// node visited last in post-order wins.
    pub fn name_to_id(&self) -> FxHashMap<String, NodeId> {
        let mut map = FxHashMap::default();
        for id in self.post_order() {
            if let Some(name) = &self.nodes[id].name {
                map.insert(name.clone(), id);
            }
        }
        map
    }

    /// Names of all named leaves in post-order.
    pub fn leaf_names(&self) -> Vec<&str> {
        self.post_order()
            .filter(|&id| self.is_leaf(id))
            .filter_map(|id| self.nodes[id].name.as_deref())
            .collect()
    }

    /// Most recent common ancestor of two nodes.
    ///
    /// Collects the ancestors of `a` (including `a`), then walks up from `b`
    /// (starting at `b`) until it hits one of them.
    pub fn mrca(&self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let mut ancestors = FxHashSet::default();
        let mut current = Some(a);
        while let Some(id) = current {
            ancestors.insert(id);
            current = self.parent(id);
        }

        let mut current = Some(b);
        while let Some(id) = current {
            if ancestors.contains(&id) {
                return Ok(id);
            }
            current = self.parent(id);
        }
        Err(ScoreError::NoCommonAncestor(a, b))
    }

    /// True if `ancestor` lies on the path from `node` to the root
    /// (`node` itself included).
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }
}

impl FromStr for Tree {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self> {
        Tree::parse(s)
    }
}

/// Iterator for post-order traversal (children before parents), using an
/// explicit stack instead of recursion.
pub struct PostOrderIter<'a> {
    tree: &'a Tree,
    stack: Vec<(NodeId, bool)>, // (id, children_visited)
}

impl<'a> Iterator for PostOrderIter<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((id, children_visited)) = self.stack.pop() {
            let children = self.tree.children(id);
            if children_visited || children.is_empty() {
                return Some(id);
            }
            self.stack.push((id, true));
            // Reversed so the first child comes out first
            for &child in children.iter().rev() {
                self.stack.push((child, false));
            }
        }
        None
    }
}

// Characters that end an unquoted label or branch length
const NEWICK_DELIMITERS: &[u8] = b"(),:;[";

struct NewickReader<'a> {
    input: &'a str,
    pos: usize,
    nodes: Vec<Node>,
}

impl<'a> NewickReader<'a> {
    fn new(input: &'a str) -> Self {
        NewickReader {
            input,
            pos: 0,
            nodes: Vec::new(),
        }
    }

    fn error(&self, msg: &str) -> ScoreError {
        ScoreError::Format(format!(
            "{} at offset {} in tree '{}'",
            msg, self.pos, self.input
        ))
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn add_node(&mut self, parent: Option<NodeId>) -> NodeId {
        self.nodes.push(Node { name: None, parent });
        self.nodes.len() - 1
    }

    /// Skips whitespace and `[...]` comments.
    fn skip_ignorable(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => self.pos += 1,
                Some(b'[') => match self.input[self.pos..].find(']') {
                    Some(offset) => self.pos += offset + 1,
                    None => return Err(self.error("Unterminated comment")),
                },
                _ => return Ok(()),
            }
        }
    }

    fn read(mut self) -> Result<Tree> {
        // Internal nodes whose closing parenthesis has not been seen yet
        let mut open: Vec<NodeId> = Vec::new();
        // Node that may still receive a label or branch length
        let mut current: Option<NodeId> = None;
        let mut top_level: Option<NodeId> = None;
        let mut terminated = false;

        loop {
            self.skip_ignorable()?;
            let Some(c) = self.peek() else { break };
            match c {
                b'(' => {
                    if current.is_some() {
                        return Err(self.error("Unexpected '('"));
                    }
                    let parent = open.last().copied();
                    if parent.is_none() && top_level.is_some() {
                        return Err(self.error("More than one root"));
                    }
                    let id = self.add_node(parent);
                    if parent.is_none() {
                        top_level = Some(id);
                    }
                    open.push(id);
                    self.pos += 1;
                }
                b',' | b')' => {
                    let Some(&parent) = open.last() else {
                        return Err(self.error(&format!("Unexpected '{}'", c as char)));
                    };
                    if current.is_none() {
                        // Empty leaf, as in "(,A)"
                        self.add_node(Some(parent));
                    }
                    current = None;
                    if c == b')' {
                        open.pop();
                        current = Some(parent);
                    }
                    self.pos += 1;
                }
                b':' => {
                    let Some(id) = current.or_else(|| self.new_leaf(&open, &mut top_level)) else {
                        return Err(self.error("More than one root"));
                    };
                    current = Some(id);
                    self.pos += 1;
                    self.skip_ignorable()?;
                    let token = self.read_unquoted();
                    if token.parse::<f64>().is_err() {
                        return Err(self.error(&format!("Invalid branch length '{}'", token)));
                    }
                }
                b';' => {
                    if !open.is_empty() {
                        return Err(self.error("Unbalanced parentheses"));
                    }
                    self.pos += 1;
                    terminated = true;
                    break;
                }
                _ => {
                    let id = match current {
                        Some(id) if self.nodes[id].name.is_none() => id,
                        Some(_) => return Err(self.error("Unexpected label")),
                        None => match self.new_leaf(&open, &mut top_level) {
                            Some(id) => id,
                            None => return Err(self.error("More than one root")),
                        },
                    };
                    let label = if c == b'\'' {
                        self.read_quoted()?
                    } else {
                        self.read_unquoted().to_string()
                    };
                    self.nodes[id].name = Some(label);
                    current = Some(id);
                }
            }
        }

        if terminated {
            self.skip_ignorable()?;
            if self.peek().is_some() {
                return Err(self.error("Trailing characters after ';'"));
            }
        } else if !open.is_empty() {
            return Err(self.error("Unbalanced parentheses"));
        }

        let Some(root) = top_level else {
            return Err(self.error("Empty tree"));
        };

        let mut children = vec![Vec::new(); self.nodes.len()];
        for (id, node) in self.nodes.iter().enumerate() {
            if let Some(parent) = node.parent {
                children[parent].push(id);
            }
        }

        Ok(Tree {
            nodes: self.nodes,
            children,
            root,
        })
    }

    /// Starts a leaf under the innermost open node, or the root leaf of a
    /// single-node tree. Returns `None` if a root already exists.
    fn new_leaf(&mut self, open: &[NodeId], top_level: &mut Option<NodeId>) -> Option<NodeId> {
        let parent = open.last().copied();
        if parent.is_none() {
            if top_level.is_some() {
                return None;
            }
            let id = self.add_node(None);
            *top_level = Some(id);
            return Some(id);
        }
        Some(self.add_node(parent))
    }

    fn read_unquoted(&mut self) -> &'a str {
        let input = self.input;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if NEWICK_DELIMITERS.contains(&c) || c.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
        &input[start..self.pos]
    }

    fn read_quoted(&mut self) -> Result<String> {
        // Skip the opening quote
        self.pos += 1;
        let mut label = String::new();
        loop {
            let rest = &self.input[self.pos..];
            let Some(offset) = rest.find('\'') else {
                return Err(self.error("Unterminated quoted label"));
            };
            label.push_str(&rest[..offset]);
            self.pos += offset + 1;
            if self.peek() == Some(b'\'') {
                label.push('\'');
                self.pos += 1;
            } else {
                return Ok(label);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_of(tree: &Tree, name: &str) -> NodeId {
        *tree.name_to_id().get(name).unwrap()
    }

    #[test]
    fn test_parse_species_tree() {
        let tree = Tree::parse("((A:1,B:1)AB:1,C:2)root;").unwrap();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.name(tree.root()).unwrap(), "root");
        assert_eq!(tree.leaf_names(), vec!["A", "B", "C"]);

        let ab = id_of(&tree, "AB");
        assert_eq!(tree.children(ab).len(), 2);
        assert_eq!(tree.parent(ab), Some(tree.root()));
        assert_eq!(tree.parent(tree.root()), None);
    }

    #[test]
    fn test_parse_column_labels() {
        let tree =
            Tree::parse("((hg19.chr1.random|12345,panTro2.chr1|10)Anc0.1|5,mm9.chr_2|7)Anc1.0|3;")
                .unwrap();
        assert_eq!(
            tree.leaf_names(),
            vec!["hg19.chr1.random|12345", "panTro2.chr1|10", "mm9.chr_2|7"]
        );
        assert!(tree.name_to_id().contains_key("Anc0.1|5"));
    }

    #[test]
    fn test_parse_unnamed_internal_nodes() {
        let tree = Tree::parse("((A,B),C);").unwrap();
        assert!(!tree.has_name(tree.root()));
        assert!(matches!(
            tree.name(tree.root()),
            Err(ScoreError::UnnamedNode(_))
        ));
    }

    #[test]
    fn test_parse_quotes_comments_whitespace() {
        let tree = Tree::parse(" ( 'it''s a'[&comment] : 0.5 , B ) ; ").unwrap();
        assert_eq!(tree.leaf_names(), vec!["it's a", "B"]);
    }

    #[test]
    fn test_parse_without_semicolon() {
        let tree = Tree::parse("(A,B)C").unwrap();
        assert_eq!(tree.name(tree.root()).unwrap(), "C");
    }

    #[test]
    fn test_parse_single_leaf() {
        let tree = Tree::parse("A;").unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.leaf_names(), vec!["A"]);
    }

    #[test]
    fn test_parse_malformed() {
        for bad in [
            "((A,B);",
            "(A,B));",
            "(A,B);(C,D);",
            "(A:x,B);",
            "(A,B)C D;",
            "('A,B);",
            "",
            "(A,B)C; trailing",
        ] {
            assert!(
                matches!(Tree::parse(bad), Err(ScoreError::Format(_))),
                "expected format error for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_post_order_children_first() {
        let tree = Tree::parse("((A,B)AB,(C,(D,E)DE)CDE)root;").unwrap();
        let order: Vec<&str> = tree
            .post_order()
            .map(|id| tree.name(id).unwrap())
            .collect();
        assert_eq!(order, vec!["A", "B", "AB", "C", "D", "E", "DE", "CDE", "root"]);

        let mut seen = vec![false; tree.len()];
        for id in tree.post_order() {
            for &child in tree.children(id) {
                assert!(seen[child]);
            }
            seen[id] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_mrca() {
        let tree = Tree::parse("((A,B)AB,(C,(D,E)DE)CDE)root;").unwrap();
        let mrca = |a: &str, b: &str| {
            let id = tree.mrca(id_of(&tree, a), id_of(&tree, b)).unwrap();
            tree.name(id).unwrap().to_string()
        };
        assert_eq!(mrca("A", "B"), "AB");
        assert_eq!(mrca("D", "C"), "CDE");
        assert_eq!(mrca("A", "E"), "root");
        assert_eq!(mrca("D", "D"), "D");
        assert_eq!(mrca("DE", "E"), "DE");
        assert_eq!(mrca("E", "DE"), "DE");
    }

    #[test]
    fn test_mrca_is_common_ancestor_and_idempotent() {
        let tree = Tree::parse("(((A,B),C),((D,E),(F,(G,H))));").unwrap();
        let leaves: Vec<NodeId> = tree.post_order().filter(|&id| tree.is_leaf(id)).collect();
        for &a in &leaves {
            for &b in &leaves {
                let m = tree.mrca(a, b).unwrap();
                assert!(tree.is_ancestor_or_self(m, a));
                assert!(tree.is_ancestor_or_self(m, b));
                assert_eq!(tree.mrca(m, a).unwrap(), m);
                assert_eq!(tree.mrca(a, b).unwrap(), tree.mrca(b, a).unwrap());
                // No child of the MRCA covers both nodes
                for &child in tree.children(m) {
                    assert!(
                        !(tree.is_ancestor_or_self(child, a) && tree.is_ancestor_or_self(child, b))
                    );
                }
            }
        }
    }
}
