#![forbid(unsafe_code)]

use std::collections::HashMap;

/// Layered string map. Lookups search from the top layer down and a layer
/// is discarded as a whole on `pop`.
#[derive(Debug, Default)]
pub(crate) struct MapStack {
    layers: Vec<HashMap<String, String>>,
}

impl MapStack {
    pub fn push(&mut self) {
        self.layers.push(HashMap::new());
    }

    /// Panics without a layer.
    pub fn set(&mut self, key: &str, value: &str) {
        let Some(top) = self.layers.last_mut() else {
            panic!("MapStack::set without a layer");
        };
        top.insert(key.to_owned(), value.to_owned());
    }

    pub fn pop(&mut self) {
        self.layers.pop();
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.get(key))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_falls_through_layers() {
        let mut stack = MapStack::default();
        stack.push();
        stack.set("a", "1");
        stack.push();
        stack.set("a", "2");
        stack.set("b", "3");
        assert_eq!(stack.get("a"), Some("2"));
        stack.pop();
        assert_eq!(stack.get("a"), Some("1"));
        assert_eq!(stack.get("b"), None);
    }
}
