use hickory_proto::op::{Message, MessageType, Query};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_proto::serialize::txt::RDataParser;

use crate::error::ResolveError;

/// Lowercase a domain name and make sure it ends with the root dot.
pub fn canonical_name(name: &str) -> String {
    let mut canonical = name.to_ascii_lowercase();
    if !canonical.ends_with('.') {
        canonical.push('.');
    }
    canonical
}

/// The single question of a request, if any.
#[inline]
pub fn first_query(msg: &Message) -> Option<&Query> {
    msg.queries().first()
}

/// "name TYPE CLASS" of the first question, for logs.
pub fn question_string(msg: &Message) -> String {
    match first_query(msg) {
        Some(q) => format!("{} {} {}", q.name(), q.query_type(), q.query_class()),
        None => "<no question>".to_string(),
    }
}

/// Empty response envelope for `req`: same id, opcode, RD flag and questions.
pub fn reply_to(req: &Message) -> Message {
    let mut msg = Message::new();
    msg.set_id(req.id());
    msg.set_message_type(MessageType::Response);
    msg.set_op_code(req.op_code());
    msg.set_recursion_desired(req.recursion_desired());
    msg.set_recursion_available(true);
    msg.set_authoritative(false);
    msg.add_queries(req.queries().iter().cloned().collect::<Vec<_>>());
    msg
}

/// Copy of `req` whose first question asks for `name` instead.
pub fn with_query_name(req: &Message, name: Name) -> Message {
    let mut msg = req.clone();
    let mut queries = msg.take_queries();
    if let Some(first) = queries.first_mut() {
        first.set_name(name);
    }
    msg.add_queries(queries);
    msg
}

pub fn answer_strings(msg: &Message) -> Vec<String> {
    msg.answers().iter().map(format_record).collect()
}

pub fn has_answers(msg: &Option<Message>) -> bool {
    msg.as_ref().is_some_and(|m| !m.answers().is_empty())
}

/// Render a record as `<owner> <ttl> <CLASS> <TYPE> <rdata>`.
///
/// The output is accepted by [`parse_record`].
pub fn format_record(record: &Record) -> String {
    let mut out = format!(
        "{} {} {} {}",
        record.name().to_ascii(),
        record.ttl(),
        record.dns_class(),
        record.record_type()
    );
    if let Some(rdata) = record.data() {
        out.push(' ');
        out.push_str(&format_rdata(rdata));
    }
    out
}

fn format_rdata(rdata: &RData) -> String {
    match rdata {
        RData::A(a) => a.0.to_string(),
        RData::AAAA(aaaa) => aaaa.0.to_string(),
        RData::CNAME(name) => name.0.to_ascii(),
        RData::NS(name) => name.0.to_ascii(),
        RData::PTR(name) => name.0.to_ascii(),
        RData::MX(mx) => format!("{} {}", mx.preference(), mx.exchange().to_ascii()),
        RData::SRV(srv) => format!(
            "{} {} {} {}",
            srv.priority(),
            srv.weight(),
            srv.port(),
            srv.target().to_ascii()
        ),
        RData::SOA(soa) => format!(
            "{} {} {} {} {} {} {}",
            soa.mname().to_ascii(),
            soa.rname().to_ascii(),
            soa.serial(),
            soa.refresh(),
            soa.retry(),
            soa.expire(),
            soa.minimum()
        ),
        RData::TXT(txt) => txt
            .txt_data()
            .iter()
            .map(|chunk| quote(&String::from_utf8_lossy(chunk)))
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Parse one textual resource record, e.g. `example.com. 300 IN A 1.2.3.4`.
///
/// TTL and class are optional and may come in either order. Relative owner
/// names are treated as rooted. The rdata goes through hickory's zone-file
/// parser, so any type it knows can be replayed.
pub fn parse_record(line: &str) -> Result<Record, ResolveError> {
    let (owner, mut rest) =
        next_token(line).ok_or_else(|| ResolveError::malformed(line, "empty record"))?;
    let owner = parse_name(line, owner)?;

    let mut ttl: Option<u32> = None;
    let mut class: Option<DNSClass> = None;
    let record_type = loop {
        let (tok, tail) =
            next_token(rest).ok_or_else(|| ResolveError::malformed(line, "missing record type"))?;
        rest = tail;
        if ttl.is_none() {
            if let Ok(v) = tok.parse::<u32>() {
                ttl = Some(v);
                continue;
            }
        }
        if class.is_none() {
            if let Some(c) = parse_class(tok) {
                class = Some(c);
                continue;
            }
        }
        break tok
            .to_ascii_uppercase()
            .parse::<RecordType>()
            .map_err(|_| ResolveError::malformed(line, format!("unknown record type {tok}")))?;
    };

    let rdata = RData::try_from_str(record_type, rest.trim())
        .map_err(|e| ResolveError::malformed(line, format!("bad {record_type} rdata: {e}")))?;

    let mut record = Record::from_rdata(owner, ttl.unwrap_or(0), rdata);
    record.set_dns_class(class.unwrap_or(DNSClass::IN));
    Ok(record)
}

/// Split off the first whitespace-delimited token.
fn next_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    Some(s.split_at(end))
}

fn parse_class(tok: &str) -> Option<DNSClass> {
    match tok.to_ascii_uppercase().as_str() {
        "IN" => Some(DNSClass::IN),
        "CH" => Some(DNSClass::CH),
        "HS" => Some(DNSClass::HS),
        _ => None,
    }
}

fn parse_name(line: &str, raw: &str) -> Result<Name, ResolveError> {
    let fqdn = if raw.ends_with('.') {
        raw.to_string()
    } else {
        format!("{raw}.")
    };
    Name::from_ascii(&fqdn).map_err(|e| ResolveError::malformed(line, format!("bad name {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    #[test]
    fn canonical_name_lowercases_and_roots() {
        assert_eq!(canonical_name("Example.COM"), "example.com.");
        assert_eq!(canonical_name("example.com."), "example.com.");
        assert_eq!(canonical_name("*"), "*.");
    }

    #[test]
    fn parse_record_accepts_tabs_and_spaces() {
        let record = parse_record("sofi.com.\t197\tIN\tA\t172.64.154.149").expect("parse");
        assert_eq!(record.record_type(), RecordType::A);
        assert_eq!(record.ttl(), 197);
        assert_eq!(record.dns_class(), DNSClass::IN);
        match record.data() {
            Some(RData::A(a)) => assert_eq!(a.0, Ipv4Addr::new(172, 64, 154, 149)),
            other => panic!("unexpected rdata {other:?}"),
        }
    }

    #[test]
    fn parse_record_ttl_and_class_are_optional() {
        let record = parse_record("example.com. A 10.0.0.1").expect("parse");
        assert_eq!(record.ttl(), 0);
        assert_eq!(record.dns_class(), DNSClass::IN);

        let record = parse_record("example.com. IN 60 AAAA 2001:db8::1").expect("parse");
        assert_eq!(record.ttl(), 60);
        assert_eq!(record.record_type(), RecordType::AAAA);
    }

    #[test]
    fn parse_srv_keeps_owner_and_target() {
        let record = parse_record("tacos.com. 60 IN SRV 0 100 42 tacos.com.").expect("parse");
        assert_eq!(record.name(), &Name::from_str("tacos.com.").unwrap());
        match record.data() {
            Some(RData::SRV(srv)) => {
                assert_eq!(srv.priority(), 0);
                assert_eq!(srv.weight(), 100);
                assert_eq!(srv.port(), 42);
                assert_eq!(srv.target().to_ascii(), "tacos.com.");
            }
            other => panic!("unexpected rdata {other:?}"),
        }
    }

    #[test]
    fn format_record_is_single_spaced() {
        let record = parse_record("google.com.\t300\tIN\tA\t4.3.2.1").expect("parse");
        assert_eq!(format_record(&record), "google.com. 300 IN A 4.3.2.1");

        let record = parse_record("mail.example.com. 300 IN MX 10 mx1.example.com.").expect("parse");
        assert_eq!(
            format_record(&record),
            "mail.example.com. 300 IN MX 10 mx1.example.com."
        );
    }

    #[test]
    fn txt_strings_survive_formatting() {
        let line = r#"example.com. 120 IN TXT "v=spf1 -all" "hello world""#;
        let record = parse_record(line).expect("parse");
        let text = format_record(&record);
        assert_eq!(text, line);
        let again = parse_record(&text).expect("reparse");
        assert_eq!(again, record);
    }

    #[test]
    fn parse_record_rejects_garbage() {
        for line in [
            "",
            "example.com. 300 IN A not-an-ip",
            "example.com. 300 IN A",
            "example.com. 300 IN BOGUS 1",
            "example.com. 300 IN MX ten mx.example.com.",
            "example.com. 300 IN",
        ] {
            let err = parse_record(line).expect_err(line);
            assert!(matches!(err, ResolveError::MalformedRecord { .. }), "{line}: {err}");
        }
    }

    #[test]
    fn formatted_records_of_any_type_parse_back() {
        let owner = Name::from_str("host.test.").unwrap();
        for (rtype, rdata) in [
            (RecordType::HINFO, "cpu os"),
            (RecordType::CAA, "0 issue \"letsencrypt.org\""),
            (RecordType::SRV, "0 100 42 a.com."),
            (RecordType::SOA, "ns.test. admin.test. 1 7200 900 1209600 60"),
            (RecordType::A, "9.9.9.9"),
        ] {
            let rdata = RData::try_from_str(rtype, rdata).expect("rdata");
            let record = Record::from_rdata(owner.clone(), 60, rdata);
            let text = format_record(&record);
            let parsed = parse_record(&text).unwrap_or_else(|e| panic!("{text}: {e}"));
            assert_eq!(parsed, record, "{text}");
        }
    }

    #[test]
    fn reply_to_copies_envelope() {
        let mut req = Message::new();
        req.set_id(4242);
        req.set_recursion_desired(true);
        req.add_query(Query::query(Name::from_str("a.com.").unwrap(), RecordType::A));

        let reply = reply_to(&req);
        assert_eq!(reply.id(), 4242);
        assert_eq!(reply.message_type(), MessageType::Response);
        assert!(reply.recursion_desired());
        assert_eq!(reply.queries(), req.queries());
        assert!(reply.answers().is_empty());
    }

    #[test]
    fn with_query_name_leaves_original_untouched() {
        let mut req = Message::new();
        req.add_query(Query::query(Name::from_str("db.").unwrap(), RecordType::A));

        let swapped = with_query_name(&req, Name::from_str("db.corp.example.").unwrap());
        assert_eq!(swapped.queries()[0].name().to_ascii(), "db.corp.example.");
        assert_eq!(swapped.queries()[0].query_type(), RecordType::A);
        assert_eq!(req.queries()[0].name().to_ascii(), "db.");
    }
}
