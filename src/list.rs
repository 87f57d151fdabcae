//! Index-linked intrusive list.
//!
//! Nodes live in the task registry; a list only stores head, tail and
//! length. Every link is a slot index, so a list never owns or copies a TCB.

/// Per-node link pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Link {
    pub prev: Option<u32>,
    pub next: Option<u32>,
}

/// Storage that holds the link of every node by index.
pub trait Linked {
    fn link(&self, idx: u32) -> Link;
    fn set_link(&mut self, idx: u32, link: Link);

    fn set_prev(&mut self, idx: u32, prev: Option<u32>) {
        let mut l = self.link(idx);
        l.prev = prev;
        self.set_link(idx, l);
    }

    fn set_next(&mut self, idx: u32, next: Option<u32>) {
        let mut l = self.link(idx);
        l.next = next;
        self.set_link(idx, l);
    }
}

/// Doubly-linked list over indices into a `Linked` store.
///
/// The caller guarantees a node is on at most one list at a time; the
/// registry enforces that with the membership tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct List {
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl List {
    pub const fn new() -> Self {
        List { head: None, tail: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn head(&self) -> Option<u32> {
        self.head
    }

    pub fn tail(&self) -> Option<u32> {
        self.tail
    }

    pub fn push_back<S: Linked + ?Sized>(&mut self, nodes: &mut S, idx: u32) {
        nodes.set_link(idx, Link { prev: self.tail, next: None });
        match self.tail {
            Some(t) => nodes.set_next(t, Some(idx)),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        self.len += 1;
    }

    pub fn push_front<S: Linked + ?Sized>(&mut self, nodes: &mut S, idx: u32) {
        nodes.set_link(idx, Link { prev: None, next: self.head });
        match self.head {
            Some(h) => nodes.set_prev(h, Some(idx)),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
        self.len += 1;
    }

    /// Link `idx` immediately before `at`, which must be on this list.
    fn insert_before<S: Linked + ?Sized>(&mut self, nodes: &mut S, at: u32, idx: u32) {
        let prev = nodes.link(at).prev;
        nodes.set_link(idx, Link { prev, next: Some(at) });
        nodes.set_prev(at, Some(idx));
        match prev {
            Some(p) => nodes.set_next(p, Some(idx)),
            None => self.head = Some(idx),
        }
        self.len += 1;
    }

    /// Insert keeping ascending `key` order. Equal keys keep arrival order.
    pub fn insert_sorted<S, F>(&mut self, nodes: &mut S, idx: u32, key: F)
    where
        S: Linked + ?Sized,
        F: Fn(&S, u32) -> u32,
    {
        let k = key(nodes, idx);
        let mut cursor = self.head;
        while let Some(c) = cursor {
            if key(nodes, c) > k {
                self.insert_before(nodes, c, idx);
                return;
            }
            cursor = nodes.link(c).next;
        }
        self.push_back(nodes, idx);
    }

    /// Unlink `idx`, which must be on this list. O(1).
    pub fn remove<S: Linked + ?Sized>(&mut self, nodes: &mut S, idx: u32) {
        let Link { prev, next } = nodes.link(idx);
        match prev {
            Some(p) => nodes.set_next(p, next),
            None => self.head = next,
        }
        match next {
            Some(n) => nodes.set_prev(n, prev),
            None => self.tail = prev,
        }
        nodes.set_link(idx, Link::default());
        self.len -= 1;
    }

    pub fn pop_front<S: Linked + ?Sized>(&mut self, nodes: &mut S) -> Option<u32> {
        let h = self.head?;
        self.remove(nodes, h);
        Some(h)
    }

    pub fn iter<'a, S: Linked + ?Sized>(&self, nodes: &'a S) -> Iter<'a, S> {
        Iter { nodes, cursor: self.head }
    }
}

/// Front-to-back iterator over node indices.
pub struct Iter<'a, S: Linked + ?Sized> {
    nodes: &'a S,
    cursor: Option<u32>,
}

impl<'a, S: Linked + ?Sized> Iterator for Iter<'a, S> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let c = self.cursor?;
        self.cursor = self.nodes.link(c).next;
        Some(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    struct Nodes {
        links: Vec<Link>,
        keys: Vec<u32>,
    }

    impl Nodes {
        fn new(keys: &[u32]) -> Self {
            Nodes { links: vec![Link::default(); keys.len()], keys: keys.to_vec() }
        }
    }

    impl Linked for Nodes {
        fn link(&self, idx: u32) -> Link {
            self.links[idx as usize]
        }
        fn set_link(&mut self, idx: u32, link: Link) {
            self.links[idx as usize] = link;
        }
    }

    fn collect(list: &List, nodes: &Nodes) -> Vec<u32> {
        list.iter(nodes).collect()
    }

    #[test]
    fn push_and_remove_middle() {
        let mut nodes = Nodes::new(&[0; 3]);
        let mut list = List::new();
        for i in 0..3 {
            list.push_back(&mut nodes, i);
        }
        list.remove(&mut nodes, 1);
        assert_eq!(collect(&list, &nodes), vec![0, 2]);
        assert_eq!(list.len(), 2);
        assert_eq!(nodes.link(1), Link::default());
        assert_eq!(list.tail(), Some(2));
    }

    #[test]
    fn push_front_then_pop() {
        let mut nodes = Nodes::new(&[0; 2]);
        let mut list = List::new();
        list.push_back(&mut nodes, 0);
        list.push_front(&mut nodes, 1);
        assert_eq!(list.pop_front(&mut nodes), Some(1));
        assert_eq!(list.pop_front(&mut nodes), Some(0));
        assert_eq!(list.pop_front(&mut nodes), None);
        assert!(list.is_empty());
        assert_eq!(list.head(), None);
        assert_eq!(list.tail(), None);
    }

    #[test]
    fn sorted_insert_is_stable() {
        let mut nodes = Nodes::new(&[5, 3, 5, 1, 9]);
        let mut list = List::new();
        for i in 0..5 {
            list.insert_sorted(&mut nodes, i, |n, idx| n.keys[idx as usize]);
        }
        assert_eq!(collect(&list, &nodes), vec![3, 1, 0, 2, 4]);
    }
}
