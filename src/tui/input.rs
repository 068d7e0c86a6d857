/// Cursor-aware editing of the single-line input box.
/// `cursor` is always a byte offset on a char boundary of `input`.

/// Insert `c` at the cursor and advance past it.
pub fn insert_char(input: &mut String, cursor: &mut usize, c: char) {
    let mut buf = [0u8; 4];
    let s = c.encode_utf8(&mut buf);
    input.insert_str(*cursor, s);
    *cursor += s.len();
}

/// Remove the character immediately before the cursor.
pub fn backspace(input: &mut String, cursor: &mut usize) {
    if *cursor == 0 {
        return;
    }
    let prev = prev_char_boundary(input, *cursor);
    input.drain(prev..*cursor);
    *cursor = prev;
}

/// Delete the character at the cursor position.
pub fn delete_forward(input: &mut String, cursor: &mut usize) {
    if *cursor >= input.len() {
        return;
    }
    let next = next_char_boundary(input, *cursor);
    input.drain(*cursor..next);
}

/// Delete the word immediately before the cursor.
pub fn delete_word(input: &mut String, cursor: &mut usize) {
    if *cursor == 0 {
        return;
    }
    let start = word_left(input, *cursor);
    input.drain(start..*cursor);
    *cursor = start;
}

pub fn prev_char_boundary(s: &str, pos: usize) -> usize {
    s[..pos.min(s.len())]
        .char_indices()
        .next_back()
        .map(|(i, _)| i)
        .unwrap_or(0)
}

pub fn next_char_boundary(s: &str, pos: usize) -> usize {
    match s.get(pos..).and_then(|rest| rest.chars().next()) {
        Some(c) => pos + c.len_utf8(),
        None => s.len(),
    }
}

/// Start of the previous word (skip trailing spaces, then the word).
pub fn word_left(s: &str, mut pos: usize) -> usize {
    let bytes = s.as_bytes();
    while pos > 0 && bytes[pos - 1].is_ascii_whitespace() {
        pos -= 1;
    }
    while pos > 0 && !bytes[pos - 1].is_ascii_whitespace() {
        pos -= 1;
    }
    pos
}

/// Just past the end of the next word.
pub fn word_right(s: &str, mut pos: usize) -> usize {
    let bytes = s.as_bytes();
    let len = s.len();
    while pos < len && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    while pos < len && !bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}
