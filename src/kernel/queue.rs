// Intrusive FIFO of externally owned tasks
//
// Circular singly-linked list reached through its tail:
//
//            tail
//             |
//             v
//   T1 -> T2 -> ... -> Tn
//   ^                  |
//   +------------------+
//
// head is tail.next. push and pop are O(1) and never allocate; the queue
// only rewires links, it never owns task storage.
use core::fmt;

use super::task::{Task, same_task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutError {
    /// Task is already a member of this or another queue; nothing changed
    AlreadyQueued,
}

impl fmt::Display for PutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutError::AlreadyQueued => write!(f, "task already queued"),
        }
    }
}

impl core::error::Error for PutError {}

pub struct Queue {
    tail: Option<&'static dyn Task>,
    len: usize,
}

impl Queue {
    pub const fn new() -> Self {
        Self { tail: None, len: 0 }
    }

    /// Append `task` behind every current member.
    ///
    /// Fails without touching anything if the task already sits in a queue,
    /// including this one.
    pub fn push(&mut self, task: &'static dyn Task) -> Result<&'static dyn Task, PutError> {
        let link = task.link();
        if !link.claim() {
            return Err(PutError::AlreadyQueued);
        }

        match self.tail {
            Some(tail) => {
                if let Some(head) = tail.link().next() {
                    link.set_next(head);
                }
                tail.link().set_next(task);
            }
            // one element cycle
            None => link.set_next(task),
        }
        self.tail = Some(task);
        self.len += 1;
        Ok(task)
    }

    // head without removing it
    pub fn peek(&self) -> Option<&'static dyn Task> {
        self.tail.and_then(|tail| tail.link().next())
    }

    /// Remove the head and release its link so it can be queued again.
    pub fn pop(&mut self) -> Option<&'static dyn Task> {
        let tail = self.tail?;
        let head = tail.link().next()?;

        if same_task(head, tail) {
            self.tail = None;
        } else if let Some(after) = head.link().next() {
            tail.link().set_next(after);
        }
        head.link().release();
        self.len -= 1;
        Some(head)
    }

    pub fn is_empty(&self) -> bool {
        self.tail.is_none()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn contains(&self, task: &dyn Task) -> bool {
        let Some(tail) = self.tail else {
            return false;
        };
        let mut cur = tail;
        for _ in 0..self.len {
            let Some(next) = cur.link().next() else {
                return false;
            };
            if same_task(next, task) {
                return true;
            }
            cur = next;
        }
        false
    }

    pub fn clear(&mut self) {
        while self.pop().is_some() {}
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

// members would otherwise stay claimed forever
impl Drop for Queue {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue").field("len", &self.len).finish()
    }
}
