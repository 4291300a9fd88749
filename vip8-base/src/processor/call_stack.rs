use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Error)]
#[error("call stack capacity exceeded, pushing of address {address_not_pushed:X} failed")]
pub struct CallStackCapacityExceededError {
    pub address_not_pushed: u16,
}

/// Return addresses of the active subroutine calls, with a fixed capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStack {
    addresses: Vec<u16>,
    capacity: usize,
}

impl CallStack {
    /// Nesting depth supported by the historical interpreters.
    pub const DEFAULT_CAPACITY: usize = 16;

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            addresses: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Return addresses, oldest first.
    pub fn as_slice(&self) -> &[u16] {
        &self.addresses
    }

    pub fn pop(&mut self) -> Option<u16> {
        self.addresses.pop()
    }

    /// Push a return address. A full stack is left untouched.
    pub fn push(&mut self, address: u16) -> Result<(), CallStackCapacityExceededError> {
        if self.addresses.len() < self.capacity {
            self.addresses.push(address);
            Ok(())
        } else {
            Err(CallStackCapacityExceededError {
                address_not_pushed: address,
            })
        }
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn push_pop() {
        let mut stack = CallStack::default();
        stack.push(0x202).unwrap();
        stack.push(0x304).unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop(), Some(0x304));
        assert_eq!(stack.pop(), Some(0x202));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn overflow_keeps_entries() {
        let mut stack = CallStack::default();
        for i in 0..16 {
            stack.push(0x200 + i * 2).unwrap();
        }

        assert_eq!(
            stack.push(0xABC),
            Err(CallStackCapacityExceededError {
                address_not_pushed: 0xABC
            })
        );
        assert_eq!(stack.len(), 16);
        assert!(stack
            .as_slice()
            .iter()
            .copied()
            .eq((0..16).map(|i| 0x200 + i * 2)));
    }
}
