//! Compact text notation for small trees.
//!
//! ```text
//! r{a{b},c*,d',e:E}
//! ```
//!
//! Each node is a key name followed by an optional marker and an optional
//! child list in braces:
//!
//! - `a`: literal node whose content is its key name
//! - `a:X`: literal node with content `X`
//! - `a*` / `a*t`: tree reference to `a` (or to `t`)
//! - `a'` / `a't`: node reference to `a` (or to `t`)
//!
//! Whitespace is ignored.

use std::fmt::{self, Write};

use reftree_types::{Key, Payload, TreeError, TreeResult};

use crate::memory::MemTree;
use crate::traits::IdAddressable;

/// Parse an outline into a raw tree with `String` content.
pub fn parse_outline(text: &str) -> TreeResult<MemTree<String>> {
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    let mut parser = Parser { chars, at: 0 };
    let (key, payload) = parser.node_head()?;
    let mut tree = MemTree::rooted(key.clone(), payload);
    parser.children(&mut tree, &key)?;
    if parser.at != parser.chars.len() {
        return Err(parser.unexpected());
    }
    Ok(tree)
}

struct Parser {
    chars: Vec<char>,
    at: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.at).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.at += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> TreeError {
        match self.peek() {
            Some(c) => TreeError::invalid(format!("unexpected '{c}' at {} in outline", self.at)),
            None => TreeError::invalid("outline ends early"),
        }
    }

    fn word(&mut self) -> Option<String> {
        let start = self.at;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            self.at += 1;
        }
        (self.at > start).then(|| self.chars[start..self.at].iter().collect())
    }

    fn node_head(&mut self) -> TreeResult<(Key, Payload<String>)> {
        let name = self.word().ok_or_else(|| self.unexpected())?;
        let key = Key::name(name.as_str());
        let payload = if self.eat('*') {
            Payload::TreeRef(self.word().map_or_else(|| key.clone(), Key::name))
        } else if self.eat('\'') {
            Payload::NodeRef(self.word().map_or_else(|| key.clone(), Key::name))
        } else if self.eat(':') {
            Payload::Literal(self.word().ok_or_else(|| self.unexpected())?)
        } else {
            Payload::Literal(name)
        };
        Ok((key, payload))
    }

    fn children(&mut self, tree: &mut MemTree<String>, parent: &Key) -> TreeResult<()> {
        if !self.eat('{') {
            return Ok(());
        }
        loop {
            let (key, payload) = self.node_head()?;
            tree.append(parent, key.clone(), payload)?;
            self.children(tree, &key)?;
            if self.eat('}') {
                return Ok(());
            }
            if !self.eat(',') {
                return Err(self.unexpected());
            }
        }
    }
}

/// Render a tree in outline notation.
pub fn render_outline<C: fmt::Display>(tree: &dyn IdAddressable<C>) -> TreeResult<String> {
    let mut out = String::new();
    if let Some(root) = tree.root() {
        render_node(tree, &root, &mut out)?;
    }
    Ok(out)
}

fn render_node<C: fmt::Display>(
    tree: &dyn IdAddressable<C>,
    key: &Key,
    out: &mut String,
) -> TreeResult<()> {
    let name = key.to_string();
    let rendered = match tree.node(key)? {
        Payload::Literal(content) => {
            let content = content.to_string();
            if content == name {
                write!(out, "{name}")
            } else {
                write!(out, "{name}:{content}")
            }
        }
        Payload::TreeRef(target) => write_ref(out, &name, '*', &target),
        Payload::NodeRef(target) => write_ref(out, &name, '\'', &target),
    };
    rendered.map_err(|e| TreeError::internal(e.to_string()))?;
    let children = tree.children(key)?;
    if children.is_empty() {
        return Ok(());
    }
    out.push('{');
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        render_node(tree, child, out)?;
    }
    out.push('}');
    Ok(())
}

fn write_ref(out: &mut String, name: &str, marker: char, target: &Key) -> fmt::Result {
    if target.to_string() == name {
        write!(out, "{name}{marker}")
    } else {
        write!(out, "{name}{marker}{target}")
    }
}
