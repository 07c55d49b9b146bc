/// The word currently being typed.
#[derive(Debug, Clone)]
pub struct TypedBuffer {
    chars: Vec<char>,
    max_len: usize,
}

impl TypedBuffer {
    pub fn new(max_len: usize) -> Self {
        Self {
            chars: Vec::with_capacity(max_len.min(128)),
            max_len,
        }
    }

    /// Append a character. Returns false (and drops it) when the buffer is
    /// already full.
    pub fn push(&mut self, c: char) -> bool {
        if self.chars.len() >= self.max_len {
            return false;
        }
        self.chars.push(c);
        true
    }

    pub fn pop(&mut self) -> Option<char> {
        self.chars.pop()
    }

    /// The buffered word; the buffer is left empty.
    pub fn take_word(&mut self) -> String {
        let word = self.chars.iter().collect();
        self.chars.clear();
        word
    }

    pub fn clear(&mut self) {
        self.chars.clear();
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_buffer_ignores_input() {
        let mut buffer = TypedBuffer::new(3);
        assert!("abc".chars().all(|c| buffer.push(c)));
        assert!(!buffer.push('d'));
        assert_eq!(buffer.take_word(), "abc");
        assert!(buffer.is_empty());
    }

    #[test]
    fn pop_on_empty_is_harmless() {
        let mut buffer = TypedBuffer::new(3);
        assert_eq!(buffer.pop(), None);
        buffer.push('x');
        assert_eq!(buffer.pop(), Some('x'));
        assert_eq!(buffer.len(), 0);
    }
}
