// Chunker
// Splits oversized text pairs into aligned, offset-tagged segments
//
// Chunk boundaries are chosen per text on paragraph (blank-line) borders,
// falling back to sentence-terminal and whitespace borders for paragraphs
// larger than the limit. A chunk never starts or ends mid-word or inside
// a UTF-8 code point. Sizes are measured in Unicode scalar count, not
// UTF-8 byte length; offsets are byte positions into the full text.

/// A bounded slice of a longer text, tagged with its byte offset in the
/// full text. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub offset: usize,
}

/// One original/generated chunk pair, analyzed independently.
#[derive(Debug, Clone)]
pub struct ChunkPair {
    pub original: Chunk,
    pub generated: Chunk,
}

impl ChunkPair {
    pub fn is_empty(&self) -> bool {
        self.original.text.trim().is_empty() && self.generated.text.trim().is_empty()
    }
}

/// Split `text` into chunks of at most `max_chars` characters on paragraph
/// boundaries, packing adjacent paragraphs greedily up to the limit.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<Chunk> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return vec![Chunk {
            text: text.to_string(),
            offset: 0,
        }];
    }

    // Paragraph segments with their byte offsets; separators stay between
    let mut paragraphs: Vec<(usize, &str)> = Vec::new();
    let mut pos = 0;
    while let Some(idx) = text[pos..].find("\n\n") {
        paragraphs.push((pos, &text[pos..pos + idx]));
        pos = pos + idx + 2;
    }
    paragraphs.push((pos, &text[pos..]));

    let mut chunks: Vec<Chunk> = Vec::new();
    // Current chunk under construction: byte range plus running char count
    let mut current: Option<(usize, usize, usize)> = None;

    for (para_start, para) in paragraphs {
        let para_chars = para.chars().count();

        if para_chars > max_chars {
            if let Some((start, end, _)) = current.take() {
                chunks.push(slice_chunk(text, start, end));
            }
            chunks.extend(split_long_paragraph(para_start, para, max_chars));
            continue;
        }

        match current {
            Some((start, end, chars)) if chars + 2 + para_chars > max_chars => {
                chunks.push(slice_chunk(text, start, end));
                current = Some((para_start, para_start + para.len(), para_chars));
            }
            Some((start, _, chars)) => {
                current = Some((start, para_start + para.len(), chars + 2 + para_chars));
            }
            None => {
                current = Some((para_start, para_start + para.len(), para_chars));
            }
        }
    }

    if let Some((start, end, _)) = current {
        chunks.push(slice_chunk(text, start, end));
    }

    chunks
}

fn slice_chunk(text: &str, start: usize, end: usize) -> Chunk {
    Chunk {
        text: text[start..end].to_string(),
        offset: start,
    }
}

/// Split one oversized paragraph, preferring sentence-terminal boundaries,
/// then whitespace, and only as a last resort a bare char boundary.
fn split_long_paragraph(base: usize, para: &str, max_chars: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < para.len() {
        let rest = &para[start..];
        if rest.chars().count() <= max_chars {
            chunks.push(Chunk {
                text: rest.to_string(),
                offset: base + start,
            });
            break;
        }

        // Byte index of the max_chars-th character: the hard window limit
        let limit = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let cut = find_cut(&rest[..limit]).unwrap_or(limit);

        chunks.push(Chunk {
            text: rest[..cut].to_string(),
            offset: base + start,
        });
        start += cut;

        // Start the next chunk at a word start
        while let Some(c) = para[start..].chars().next() {
            if !c.is_whitespace() {
                break;
            }
            start += c.len_utf8();
        }
    }

    chunks
}

/// Best split position inside `window`: after the last sentence terminal,
/// else after the last whitespace. `None` when the window is a single
/// unbroken token.
fn find_cut(window: &str) -> Option<usize> {
    let mut last_sentence_cut = None;
    let mut last_space_cut = None;
    let mut chars = window.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        let cut_after = idx + ch.len_utf8();
        if matches!(ch, '\u{3002}' | '\u{ff01}' | '\u{ff1f}') {
            // CJK terminals end a sentence without a following space
            last_sentence_cut = Some(cut_after);
        } else if matches!(ch, '.' | '!' | '?') {
            // ASCII terminals need following whitespace so decimal points
            // and abbreviations inside a token are not treated as cuts
            if chars
                .peek()
                .map_or(false, |&(_, next)| next.is_whitespace())
            {
                last_sentence_cut = Some(cut_after);
            }
        } else if ch.is_whitespace() {
            last_space_cut = Some(cut_after);
        }
    }

    last_sentence_cut.or(last_space_cut).filter(|&cut| cut > 0)
}

/// Build aligned chunk pairs for the two texts. The shorter side is padded
/// with empty chunks anchored at end-of-text so the lists zip in order.
pub fn pair_chunks(original: &str, generated: &str, max_chars: usize) -> Vec<ChunkPair> {
    let mut original_chunks = split_into_chunks(original, max_chars);
    let mut generated_chunks = split_into_chunks(generated, max_chars);

    let count = original_chunks.len().max(generated_chunks.len());
    while original_chunks.len() < count {
        original_chunks.push(Chunk {
            text: String::new(),
            offset: original.len(),
        });
    }
    while generated_chunks.len() < count {
        generated_chunks.push(Chunk {
            text: String::new(),
            offset: generated.len(),
        });
    }

    original_chunks
        .into_iter()
        .zip(generated_chunks)
        .map(|(original, generated)| ChunkPair {
            original,
            generated,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(word: &str, words: usize) -> String {
        vec![word; words].join(" ")
    }

    #[test]
    fn test_small_text_is_single_chunk() {
        let chunks = split_into_chunks("short text", 3000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[0].text, "short text");
    }

    #[test]
    fn test_offsets_match_source_slices() {
        // ~9000 chars in 30 paragraphs of ~296 chars each
        let para = paragraph("word", 60);
        let text = vec![para; 30].join("\n\n");
        assert!(text.len() > 8000);

        let chunks = split_into_chunks(&text, 3000);
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 3000);
            assert_eq!(
                &text[chunk.offset..chunk.offset + chunk.text.len()],
                chunk.text
            );
        }
        // Chunks appear in source order
        for pair in chunks.windows(2) {
            assert!(pair[0].offset < pair[1].offset);
        }
    }

    #[test]
    fn test_paragraph_boundaries_preferred() {
        let text = format!(
            "{}\n\n{}\n\n{}",
            paragraph("alpha", 40),
            paragraph("beta", 40),
            paragraph("gamma", 40)
        );
        // Each paragraph is ~240 chars; a 300-char budget fits exactly one
        let chunks = split_into_chunks(&text, 300);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].text.starts_with("alpha"));
        assert!(chunks[1].text.starts_with("beta"));
        assert!(chunks[2].text.starts_with("gamma"));
    }

    #[test]
    fn test_never_splits_mid_word() {
        // One long paragraph with no blank lines
        let text = paragraph("sentence", 600) + ". " + &paragraph("closing", 600);
        let chunks = split_into_chunks(&text, 1000);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            // A chunk boundary in the middle of a word would leave a
            // non-whitespace character on both sides of the cut.
            let end = chunk.offset + chunk.text.len();
            if end < text.len() {
                let last = chunk.text.chars().last().unwrap();
                let next = text[end..].chars().next().unwrap();
                assert!(
                    last.is_whitespace() || next.is_whitespace(),
                    "cut between {:?} and {:?}",
                    last,
                    next
                );
            }
            assert_eq!(
                &text[chunk.offset..chunk.offset + chunk.text.len()],
                chunk.text
            );
        }
    }

    #[test]
    fn test_sentence_terminal_cut_preferred() {
        let first = paragraph("alpha", 30) + ".";
        let text = format!("{} {}", first, paragraph("beta", 200));
        let chunks = split_into_chunks(&text, 300);
        assert!(chunks.len() > 1);
        assert!(chunks[0].text.trim_end().ends_with('.'));
    }

    #[test]
    fn test_multibyte_text_splits_on_char_boundaries() {
        let text = "\u{4e2d}\u{6587}\u{3002}".repeat(500);
        let chunks = split_into_chunks(&text, 400);
        for chunk in &chunks {
            assert!(text.is_char_boundary(chunk.offset));
            assert_eq!(
                &text[chunk.offset..chunk.offset + chunk.text.len()],
                chunk.text
            );
        }
    }

    #[test]
    fn test_pair_padding_anchors_at_end_of_text() {
        let original = vec![paragraph("word", 60); 10].join("\n\n");
        let generated = paragraph("word", 30);
        let pairs = pair_chunks(&original, &generated, 1000);

        assert!(pairs.len() > 1);
        assert_eq!(pairs[0].generated.text, paragraph("word", 30));
        for pair in &pairs[1..] {
            assert_eq!(pair.generated.text, "");
            assert_eq!(pair.generated.offset, generated.len());
        }
    }

    #[test]
    fn test_empty_pair_detection() {
        let pair = ChunkPair {
            original: Chunk {
                text: "  ".to_string(),
                offset: 0,
            },
            generated: Chunk {
                text: String::new(),
                offset: 0,
            },
        };
        assert!(pair.is_empty());
    }
}
