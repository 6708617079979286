use super::*;
use crate::endpoint::Properties;
use crate::endpoint::PropertyValue;
use crate::FilterError;

fn props(pairs: Vec<(&str, PropertyValue)>) -> Properties {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn parse(s: &str) -> PropertyFilter {
    s.parse().unwrap_or_else(|e| panic!("failed to parse {s}: {e}"))
}

/// `levels` nested negations around `(a=b)`.
fn nested_not(levels: usize) -> String {
    format!("{}(a=b){}", "(!".repeat(levels), ")".repeat(levels))
}

#[test]
fn test_parse_equality() {
    assert_eq!(parse("(region=eu)"), PropertyFilter::equal("region", "eu"));
    assert_eq!(parse("  ( region = eu)"), PropertyFilter::equal("region", " eu"));
}

#[test]
fn test_parse_composites() {
    let filter = parse("(&(region=eu)(|(tier=gold)(!(legacy=true))))");
    assert_eq!(
        filter,
        PropertyFilter::And(vec![
            PropertyFilter::equal("region", "eu"),
            PropertyFilter::Or(vec![
                PropertyFilter::equal("tier", "gold"),
                PropertyFilter::Not(Box::new(PropertyFilter::equal("legacy", "true"))),
            ]),
        ])
    );
}

#[test]
fn test_parse_presence_and_substring() {
    assert_eq!(parse("(region=*)"), PropertyFilter::Present("region".into()));
    assert_eq!(
        parse("(host=*.example.*)"),
        PropertyFilter::Substring("host".into(), vec!["".into(), ".example.".into(), "".into()])
    );
}

#[test]
fn test_parse_escaped_value() {
    assert_eq!(parse(r"(name=a\*b\)c)"), PropertyFilter::equal("name", "a*b)c"));
}

#[test]
fn test_parse_errors() {
    assert!(matches!("region=eu".parse::<PropertyFilter>(), Err(FilterError::UnexpectedChar { .. })));
    assert!(matches!("(region=eu".parse::<PropertyFilter>(), Err(FilterError::UnexpectedEnd(_))));
    assert!(matches!("(=eu)".parse::<PropertyFilter>(), Err(FilterError::MissingAttribute(_))));
    assert!(matches!("(a=b)(c=d)".parse::<PropertyFilter>(), Err(FilterError::TrailingInput(_))));
    assert!("(&)".parse::<PropertyFilter>().is_err());
    assert!("(a<b)".parse::<PropertyFilter>().is_err());
}

#[test]
fn test_equality_matching_by_kind() {
    let p = props(vec![
        ("region", "eu".into()),
        ("weight", 10i64.into()),
        ("secure", true.into()),
        ("tags", vec!["a", "b"].into()),
    ]);

    assert!(parse("(region=eu)").matches(&p));
    assert!(!parse("(region=us)").matches(&p));
    assert!(parse("(weight=10)").matches(&p));
    assert!(parse("(weight= 10 )").matches(&p));
    assert!(parse("(secure=TRUE)").matches(&p));
    assert!(parse("(tags=b)").matches(&p));
    assert!(!parse("(tags=c)").matches(&p));
    assert!(!parse("(missing=x)").matches(&p));
}

#[test]
fn test_attribute_names_are_case_insensitive() {
    let p = props(vec![("Region", "eu".into())]);
    assert!(parse("(region=eu)").matches(&p));
}

#[test]
fn test_ordering_and_approx() {
    let p = props(vec![("weight", 10i64.into()), ("name", "Hello World".into())]);

    assert!(parse("(weight>=10)").matches(&p));
    assert!(parse("(weight<=11)").matches(&p));
    assert!(!parse("(weight>=11)").matches(&p));
    assert!(parse("(name~=helloworld)").matches(&p));
}

#[test]
fn test_substring_matching() {
    let p = props(vec![("host", "node1.example.com".into())]);

    assert!(parse("(host=node*)").matches(&p));
    assert!(parse("(host=*.com)").matches(&p));
    assert!(parse("(host=*example*)").matches(&p));
    assert!(!parse("(host=*.org)").matches(&p));

    let short = props(vec![("host", "ab".into())]);
    assert!(!parse("(host=ab*b)").matches(&short));
}

#[test]
fn test_presence_and_negation() {
    let p = props(vec![("region", "eu".into())]);

    assert!(parse("(region=*)").matches(&p));
    assert!(!parse("(zone=*)").matches(&p));
    assert!(parse("(!(zone=*))").matches(&p));
}

#[test]
fn test_display_reparses_to_same_filter() {
    for s in ["(&(region=eu)(!(tier=gold)))", "(|(a=*)(b~=x)(c>=1)(d<=2))", r"(name=a\*b)", "(host=pre*mid*)"] {
        let filter = parse(s);
        assert_eq!(parse(&filter.to_string()), filter, "display of {s}");
    }
}

#[test]
fn test_nesting_up_to_the_limit_parses() {
    let mut filter = parse(&nested_not(MAX_FILTER_DEPTH - 1));
    let mut levels = 0;
    while let PropertyFilter::Not(inner) = filter {
        filter = *inner;
        levels += 1;
    }
    assert_eq!(levels, MAX_FILTER_DEPTH - 1);
    assert_eq!(filter, PropertyFilter::equal("a", "b"));
}

#[test]
fn test_excessive_nesting_is_rejected() {
    // One level past the limit fails at the first parenthesis too many
    let one_too_many = nested_not(MAX_FILTER_DEPTH);
    assert_eq!(
        one_too_many.parse::<PropertyFilter>(),
        Err(FilterError::TooDeep(2 * MAX_FILTER_DEPTH))
    );

    // Hostile input is refused without exhausting the stack
    let hostile = nested_not(100_000);
    assert!(matches!(hostile.parse::<PropertyFilter>(), Err(FilterError::TooDeep(_))));
    let unterminated = "(&".repeat(100_000);
    assert!(matches!(unterminated.parse::<PropertyFilter>(), Err(FilterError::TooDeep(_))));
}
