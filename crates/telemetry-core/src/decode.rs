//! C1 — Frame decoder: UDP datagram bytes in, one `Packet` out.
//!
//! Never fails: a malformed payload produces a `Packet` with `error` set and
//! an empty `metrics` vector rather than an `Err`. See spec §4.1.

use telemetry_protocol::{Metric, MetricPayload, Packet, Prelude, Scalar};

/// Decode one UDP payload into a `Packet`.
///
/// `received_at_ms` is the epoch-millisecond wall clock captured on dequeue
/// from the socket (§3); the decoder does not read the clock itself so that
/// it stays a pure function of its inputs (testable decode idempotence).
pub fn decode(payload: &str, sender: String, received_at_ms: i64) -> Packet {
    if payload.trim().is_empty() {
        return Packet {
            sender,
            received_at_ms,
            prelude: Prelude::default(),
            metrics: Vec::new(),
            raw: Some(payload.to_owned()),
            error: Some("empty payload".to_owned()),
        };
    }

    let lines: Vec<&str> = split_lines(payload);

    // `str::split` always yields at least one element, even for an empty
    // haystack, so `lines` is never empty here (the blank-payload case is
    // handled above); the fallback is unreachable in practice.
    let mut iter = lines.into_iter();
    let first_line = iter.next().unwrap_or("");

    let prelude = parse_prelude(first_line);
    let metric_lines: Vec<&str> = if prelude.is_empty() {
        std::iter::once(first_line).chain(iter).collect()
    } else {
        iter.collect()
    };

    let mut metrics = Vec::with_capacity(metric_lines.len());
    for line in metric_lines {
        if line.trim().is_empty() {
            continue;
        }
        let mut metric = parse_metric_line(line);
        if let (Some(tm), Some(offset_ms)) = (prelude.tm, metric.offset_ms) {
            metric.device_time_us = Some(tm as i64 + offset_ms * 1000);
        }
        metrics.push(metric);
    }

    Packet {
        sender,
        received_at_ms,
        prelude,
        metrics,
        raw: Some(payload.to_owned()),
        error: None,
    }
}

// ---------------------------------------------------------------------------
// Line splitting
// ---------------------------------------------------------------------------

fn split_lines(payload: &str) -> Vec<&str> {
    payload
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect()
}

// ---------------------------------------------------------------------------
// Prelude: `(?:^|\s)msg=\d+,\s*tm=\d+,\s*v=\d+`
// ---------------------------------------------------------------------------

fn parse_prelude(line: &str) -> Prelude {
    let bytes = line.as_bytes();
    let mut search_from = 0usize;
    while let Some(rel) = line[search_from..].find("msg=") {
        let idx = search_from + rel;
        let boundary_ok = idx == 0 || bytes[idx - 1].is_ascii_whitespace();
        if boundary_ok {
            if let Some(prelude) = try_parse_prelude_at(&line[idx..]) {
                return prelude;
            }
        }
        search_from = idx + "msg=".len();
    }
    Prelude::default()
}

fn try_parse_prelude_at(rest: &str) -> Option<Prelude> {
    let rest = rest.strip_prefix("msg=")?;
    let (msg_digits, rest) = take_digits(rest);
    if msg_digits.is_empty() {
        return None;
    }
    let rest = rest.strip_prefix(',')?;
    let rest = skip_inline_ws(rest);
    let rest = rest.strip_prefix("tm=")?;
    let (tm_digits, rest) = take_digits(rest);
    if tm_digits.is_empty() {
        return None;
    }
    let rest = rest.strip_prefix(',')?;
    let rest = skip_inline_ws(rest);
    let rest = rest.strip_prefix("v=")?;
    let (v_digits, _rest) = take_digits(rest);
    if v_digits.is_empty() {
        return None;
    }
    Some(Prelude {
        msg: msg_digits.parse().ok(),
        tm: tm_digits.parse().ok(),
        v: v_digits.parse().ok(),
    })
}

fn take_digits(s: &str) -> (&str, &str) {
    let n = s.bytes().take_while(u8::is_ascii_digit).count();
    s.split_at(n)
}

fn skip_inline_ws(s: &str) -> &str {
    s.trim_start_matches(|c: char| c == ' ' || c == '\t')
}

// ---------------------------------------------------------------------------
// Metric lines: `<name> <payload...> <offset_ms>`
// ---------------------------------------------------------------------------

fn parse_metric_line(line: &str) -> Metric {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 2 {
        return unknown_metric(line);
    }

    let name = tokens[0].to_owned();
    let last = tokens[tokens.len() - 1];
    let Ok(offset_ms) = last.parse::<i64>() else {
        return unknown_metric(line);
    };

    let payload_tokens = &tokens[1..tokens.len() - 1];
    if payload_tokens.is_empty() {
        return unknown_metric(line);
    }
    let payload_str = payload_tokens.join(" ");

    let payload = if payload_tokens[0].starts_with("v=") {
        let value_str = payload_str.strip_prefix("v=").unwrap_or(&payload_str);
        MetricPayload::Numeric {
            value: parse_scalar(value_str),
        }
    } else if payload_tokens[0].starts_with("error=") {
        parse_error_payload(&payload_str)
    } else {
        parse_structured_payload(&payload_str)
    };

    Metric {
        name,
        payload,
        offset_ms: Some(offset_ms),
        device_time_us: None,
        device_time_str: None,
    }
}

fn unknown_metric(line: &str) -> Metric {
    Metric {
        name: line
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_owned(),
        payload: MetricPayload::Unknown {
            raw: line.to_owned(),
        },
        offset_ms: None,
        device_time_us: None,
        device_time_str: None,
    }
}

fn parse_error_payload(payload_str: &str) -> MetricPayload {
    let message = payload_str
        .strip_prefix("error=")
        .and_then(|rest| {
            let rest = rest.trim_start();
            let inner = rest.strip_prefix('"')?;
            let end = inner.find('"')?;
            Some(inner[..end].to_owned())
        })
        .unwrap_or_default();
    MetricPayload::Error { error: message }
}

fn parse_structured_payload(payload_str: &str) -> MetricPayload {
    let mut fields = serde_json::Map::new();
    for pair in split_outside_quotes(payload_str, ',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        if let Some((key, value)) = pair.split_once('=') {
            fields.insert(key.trim().to_owned(), scalar_to_json(parse_scalar(value)));
        }
    }
    MetricPayload::Structured { fields }
}

fn parse_scalar(tail: &str) -> Scalar {
    let trimmed = tail.trim();
    if let Some(digits) = trimmed.strip_suffix('i') {
        if let Ok(i) = digits.parse::<i64>() {
            return Scalar::Int(i);
        }
    }
    let looks_like_float = (trimmed.contains('.') || trimmed.contains('e') || trimmed.contains('E'))
        && !trimmed.starts_with('"');
    if looks_like_float {
        if let Ok(f) = trimmed.parse::<f64>() {
            return Scalar::Float(f);
        }
    }
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    Scalar::Str(unquoted.to_owned())
}

fn scalar_to_json(scalar: Scalar) -> serde_json::Value {
    match scalar {
        Scalar::Int(i) => serde_json::Value::from(i),
        Scalar::Float(f) => serde_json::Value::from(f),
        Scalar::Str(s) => serde_json::Value::from(s),
    }
}

/// Split `s` on `sep`, ignoring occurrences of `sep` inside double quotes.
/// Needed because structured payloads may carry quoted strings with
/// embedded commas or whitespace.
fn split_outside_quotes(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == sep && !in_quotes {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}
