//! ANSI terminal output to HTML.
//!
//! Build logs carry colour escapes from docker and friends. SGR colour codes
//! become `<span class="...">` elements, a reset closes every open span, and
//! all other escape sequences are dropped. Text is HTML-escaped.

const COLORS: [&str; 8] = [
    "black", "red", "green", "yellow", "blue", "magenta", "cyan", "white",
];

const ESC: char = '\x1b';
const BEL: char = '\x07';

/// CSS class for an SGR parameter, if it is a colour.
fn sgr_class(code: u32) -> Option<String> {
    let (prefix, index) = match code {
        30..=37 => ("fli", code - 30),
        40..=47 => ("bli", code - 40),
        90..=97 => ("fhi", code - 90),
        100..=107 => ("bhi", code - 100),
        _ => return None,
    };
    Some(format!("{}{}", prefix, COLORS[index as usize]))
}

/// Convert terminal output to an HTML fragment.
pub fn to_html(input: &str) -> String {
    let mut html = HtmlWriter::default();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ESC => match chars.next() {
                // CSI: parameters, intermediates, then a final byte
                Some('[') => {
                    let mut params = String::new();
                    let mut terminator = None;
                    for c in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&c) {
                            terminator = Some(c);
                            break;
                        }
                        params.push(c);
                    }
                    if terminator == Some('m') {
                        html.apply_sgr(&params);
                    }
                }
                // OSC: runs until BEL or ESC \
                Some(']') => {
                    while let Some(c) = chars.next() {
                        if c == BEL {
                            break;
                        }
                        if c == ESC && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            },
            '\r' => {}
            '\n' | '\t' => html.push_char(c),
            c if c.is_control() => {}
            c => html.push_char(c),
        }
    }

    html.finish()
}

#[derive(Default)]
struct HtmlWriter {
    out: String,
    open_spans: usize,
}

impl HtmlWriter {
    fn push_char(&mut self, c: char) {
        match c {
            '&' => self.out.push_str("&amp;"),
            '<' => self.out.push_str("&lt;"),
            '>' => self.out.push_str("&gt;"),
            '"' => self.out.push_str("&quot;"),
            '\'' => self.out.push_str("&#39;"),
            c => self.out.push(c),
        }
    }

    fn close_spans(&mut self) {
        for _ in 0..self.open_spans {
            self.out.push_str("</span>");
        }
        self.open_spans = 0;
    }

    fn apply_sgr(&mut self, params: &str) {
        // An empty parameter list means reset
        if params.is_empty() {
            self.close_spans();
            return;
        }

        let mut classes = Vec::new();
        for param in params.split(';') {
            let code = if param.is_empty() {
                0
            } else {
                match param.parse::<u32>() {
                    Ok(code) => code,
                    Err(_) => continue,
                }
            };

            match code {
                0 => {
                    self.close_spans();
                    classes.clear();
                }
                39 | 49 if classes.is_empty() => self.close_spans(),
                code => classes.extend(sgr_class(code)),
            }
        }

        if !classes.is_empty() {
            self.out.push_str("<span class=\"");
            self.out.push_str(&classes.join(" "));
            self.out.push_str("\">");
            self.open_spans += 1;
        }
    }

    fn finish(mut self) -> String {
        self.close_spans();
        self.out
    }
}
