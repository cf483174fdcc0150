use crate::error::{EvmError, EvmResult};
use sandbox_types::U256;

pub const STACK_LIMIT: usize = 1024;

#[derive(Debug, Clone)]
pub struct Stack {
    data: Vec<U256>,
}

impl Stack {
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(32),
        }
    }

    pub fn push(&mut self, value: U256) -> EvmResult<()> {
        if self.data.len() >= STACK_LIMIT {
            return Err(EvmError::StackOverflow);
        }
        self.data.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> EvmResult<U256> {
        self.data.pop().ok_or(EvmError::StackUnderflow)
    }

    /// Pops `N` words, top of the stack first.
    pub fn pop_n<const N: usize>(&mut self) -> EvmResult<[U256; N]> {
        self.require(N)?;
        let mut words = [U256::zero(); N];
        for word in words.iter_mut() {
            *word = self.pop()?;
        }
        Ok(words)
    }

    pub fn peek(&self, index: usize) -> EvmResult<U256> {
        self.data
            .len()
            .checked_sub(index + 1)
            .map(|i| self.data[i])
            .ok_or(EvmError::StackUnderflow)
    }

    /// Swaps the top with the word `n` positions below it.
    pub fn swap(&mut self, n: usize) -> EvmResult<()> {
        let top = self.data.len().checked_sub(1).ok_or(EvmError::StackUnderflow)?;
        let other = top.checked_sub(n).ok_or(EvmError::StackUnderflow)?;
        self.data.swap(top, other);
        Ok(())
    }

    /// Pushes a copy of the word `n` positions below the top.
    pub fn dup(&mut self, n: usize) -> EvmResult<()> {
        let value = self.peek(n)?;
        self.push(value)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn require(&self, n: usize) -> EvmResult<()> {
        if self.data.len() < n {
            Err(EvmError::StackUnderflow)
        } else {
            Ok(())
        }
    }

    pub fn limit_check(&self, n: usize) -> EvmResult<()> {
        if self.data.len() + n > STACK_LIMIT {
            Err(EvmError::StackOverflow)
        } else {
            Ok(())
        }
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_of(values: &[u64]) -> Stack {
        let mut stack = Stack::new();
        for value in values {
            stack.push(U256::from(*value)).unwrap();
        }
        stack
    }

    #[test]
    fn test_push_pop() {
        let mut stack = Stack::new();
        stack.push(U256::from(42)).unwrap();
        assert_eq!(stack.pop().unwrap(), U256::from(42));
        assert_eq!(stack.pop(), Err(EvmError::StackUnderflow));
    }

    #[test]
    fn test_stack_overflow() {
        let mut stack = Stack::new();
        for i in 0..STACK_LIMIT {
            stack.push(U256::from(i)).unwrap();
        }
        assert_eq!(stack.push(U256::zero()), Err(EvmError::StackOverflow));
        assert_eq!(stack.dup(0), Err(EvmError::StackOverflow));
    }

    #[test]
    fn test_pop_n_order() {
        let mut stack = stack_of(&[1, 2, 3]);
        let [a, b] = stack.pop_n().unwrap();
        assert_eq!((a, b), (U256::from(3), U256::from(2)));
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.pop_n::<2>(), Err(EvmError::StackUnderflow));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_dup() {
        let mut stack = stack_of(&[1, 2, 3]);
        stack.dup(1).unwrap();
        assert_eq!(stack.pop().unwrap(), U256::from(2));
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.dup(3), Err(EvmError::StackUnderflow));
    }

    #[test]
    fn test_swap() {
        let mut stack = stack_of(&[1, 2, 3]);
        stack.swap(2).unwrap();
        assert_eq!(stack.pop().unwrap(), U256::from(1));
        assert_eq!(stack.pop().unwrap(), U256::from(2));
        assert_eq!(stack.pop().unwrap(), U256::from(3));
        assert_eq!(stack.swap(1), Err(EvmError::StackUnderflow));
    }
}
