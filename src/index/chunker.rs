//! Token-bounded text splitter
//!
//! Splits on paragraphs first, then sentences, then words, and packs the
//! pieces greedily into chunks of at most `chunk_size` estimated tokens.
//! Consecutive chunks share up to `chunk_overlap` tokens of trailing pieces.

/// Rough token estimate (~4 chars per token), same as conversation memory
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() + 3) / 4
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

pub fn split_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    let pieces = split_pieces(text, config.chunk_size);

    let mut chunks = Vec::new();
    let mut window: Vec<(String, usize)> = Vec::new();
    let mut window_tokens = 0;

    for piece in pieces {
        // +1 accounts for the separator added when joining
        let cost = estimate_tokens(&piece) + 1;

        if !window.is_empty() && window_tokens + cost > config.chunk_size {
            chunks.push(join(&window));

            let mut kept = Vec::new();
            let mut kept_tokens = 0;
            for (p, c) in window.iter().rev() {
                if kept_tokens + c > config.chunk_overlap {
                    break;
                }
                kept_tokens += c;
                kept.push((p.clone(), *c));
            }
            kept.reverse();
            window = kept;
            window_tokens = kept_tokens;

            if window_tokens + cost > config.chunk_size {
                window.clear();
                window_tokens = 0;
            }
        }

        window.push((piece, cost));
        window_tokens += cost;
    }

    if !window.is_empty() {
        chunks.push(join(&window));
    }

    chunks
}

fn join(window: &[(String, usize)]) -> String {
    window
        .iter()
        .map(|(p, _)| p.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn split_pieces(text: &str, max_tokens: usize) -> Vec<String> {
    let mut out = Vec::new();

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if estimate_tokens(para) < max_tokens {
            out.push(para.to_string());
            continue;
        }

        for sentence in split_sentences(para) {
            if estimate_tokens(sentence) < max_tokens {
                out.push(sentence.to_string());
                continue;
            }

            let mut buf = String::new();
            for word in sentence.split_whitespace() {
                if !buf.is_empty() && estimate_tokens(&buf) + estimate_tokens(word) + 2 > max_tokens {
                    out.push(std::mem::take(&mut buf));
                }
                if !buf.is_empty() {
                    buf.push(' ');
                }
                buf.push_str(word);
            }
            if !buf.is_empty() {
                out.push(buf);
            }
        }
    }

    out
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '?' | '!') && text[i + 1..].starts_with(char::is_whitespace) {
            let sentence = text[start..=i].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = i + 1;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: ChunkConfig = ChunkConfig {
        chunk_size: 32,
        chunk_overlap: 8,
    };

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = split_text("Uber reported revenue growth.", &CONFIG);
        assert_eq!(chunks, vec!["Uber reported revenue growth.".to_string()]);
    }

    #[test]
    fn test_chunks_stay_within_budget() {
        let text = (0..40)
            .map(|i| format!("Sentence number {} talks about gross bookings.", i))
            .collect::<Vec<_>>()
            .join(" ");

        let chunks = split_text(&text, &CONFIG);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(
                estimate_tokens(chunk) <= CONFIG.chunk_size,
                "chunk over budget: {:?}",
                chunk
            );
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = (0..20)
            .map(|i| format!("Risk {}.", i))
            .collect::<Vec<_>>()
            .join(" ");

        let chunks = split_text(&text, &CONFIG);
        assert!(chunks.len() > 1);

        let first_of_second = chunks[1].lines().next().unwrap();
        assert!(chunks[0].lines().any(|l| l == first_of_second));
        assert!(chunks[1].contains(chunks[0].lines().last().unwrap()));
    }

    #[test]
    fn test_long_word_run_is_split() {
        let text = "word ".repeat(200);
        let chunks = split_text(&text, &CONFIG);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| estimate_tokens(c) <= CONFIG.chunk_size));
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("One. Two? Three! 3.5 percent"),
            vec!["One.", "Two?", "Three!", "3.5 percent"]
        );
    }
}
