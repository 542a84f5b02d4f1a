/// Stylesheet Parser - Declarations per Selector
///
/// **Core Responsibility:**
/// Turn raw stylesheet text into rules (selector list + declarations) and
/// answer "what does selector X declare?" without computing styles.
///
/// **Parsing Rules:**
/// - Tokenization and rule/declaration splitting are done by `cssparser`;
///   comments, strings, `url(..)` and nested blocks follow CSS syntax
/// - Grouping at-rules (`@media`, `@supports`, `@layer`, `@container`,
///   `@document`) are parsed recursively up to `MAX_NESTING` levels, their
///   rules are kept; anything nested deeper is skipped
/// - Other block at-rules (`@font-face`, `@keyframes`, ...) and statement
///   at-rules (`@import ...;`) are skipped
/// - Property names are lower-cased, values are re-serialized with
///   whitespace collapsed, `!important` is stripped and recorded
/// - Malformed rules and declarations are dropped, never fatal
///
/// **Merging:**
/// All rules whose selector list contains the queried selector are merged in
/// source order; a repeated property keeps the last value (last-write-wins)
/// unless the earlier one is `!important` and the later one is not.
use std::collections::HashMap;

use cssparser::{
    parse_important, AtRuleParser, BasicParseError, CowRcStr, DeclarationParser, ParseError,
    Parser, ParserInput, ParserState, QualifiedRuleParser, RuleBodyItemParser, RuleBodyParser,
    StyleSheetParser, ToCss, Token,
};
use tracing::debug;

/// Deepest block nesting that is still looked into
pub const MAX_NESTING: usize = 32;

const GROUPING_AT_RULES: [&str; 5] = ["media", "supports", "layer", "container", "document"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub selectors: Vec<String>,
    pub declarations: Vec<Declaration>,
}

/// Merged declarations of one selector, in first-declared order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarationBlock {
    order: Vec<String>,
    values: HashMap<String, (String, bool)>,
}

impl DeclarationBlock {
    fn insert(&mut self, declaration: &Declaration) {
        match self.values.get(&declaration.property) {
            None => self.order.push(declaration.property.clone()),
            Some((_, true)) if !declaration.important => return,
            Some(_) => {}
        }
        self.values.insert(
            declaration.property.clone(),
            (declaration.value.clone(), declaration.important),
        );
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.values
            .get(&property.to_ascii_lowercase())
            .map(|(value, _)| value.as_str())
    }

    pub fn contains(&self, property: &str) -> bool {
        self.get(property).is_some()
    }

    /// True when `property` is declared and its value contains `token`
    /// as a whole, case-insensitive token
    pub fn has_token(&self, property: &str, token: &str) -> bool {
        self.get(property)
            .is_some_and(|value| value_has_token(value, token))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .filter_map(|p| self.values.get(p).map(|(v, _)| (p.as_str(), v.as_str())))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheet {
    rules: Vec<Rule>,
}

impl Stylesheet {
    pub fn parse(css: &str) -> Self {
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        let mut rules = RuleListParser { depth: 0 };
        Self {
            rules: collect_rules(&mut parser, &mut rules),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Merged declarations for `selector`, or `None` if no rule targets it
    pub fn declarations(&self, selector: &str) -> Option<DeclarationBlock> {
        let wanted = normalize_selector(selector);
        let mut block: Option<DeclarationBlock> = None;

        for rule in &self.rules {
            if !rule.selectors.iter().any(|s| *s == wanted) {
                continue;
            }
            let merged = block.get_or_insert_with(DeclarationBlock::default);
            for decl in &rule.declarations {
                merged.insert(decl);
            }
        }

        block
    }
}

enum Item {
    Style(Rule),
    Group(Vec<Rule>),
    Skipped,
}

enum AtPrelude {
    Group,
    Other,
}

struct RuleListParser {
    depth: usize,
}

fn collect_rules<'i>(input: &mut Parser<'i, '_>, parser: &mut RuleListParser) -> Vec<Rule> {
    let mut rules = Vec::new();
    for item in StyleSheetParser::new(input, parser) {
        match item {
            Ok(Item::Style(rule)) => rules.push(rule),
            Ok(Item::Group(nested)) => rules.extend(nested),
            Ok(Item::Skipped) => {}
            Err((_, source)) => debug!(source, "Dropped malformed CSS rule"),
        }
    }
    rules
}

impl<'i> QualifiedRuleParser<'i> for RuleListParser {
    type Prelude = Vec<String>;
    type QualifiedRule = Item;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, ()>> {
        let mut selectors = Vec::new();
        let mut current = String::new();
        loop {
            if input.try_parse(|i| i.expect_comma()).is_ok() {
                selectors.push(normalize_selector(&std::mem::take(&mut current)));
                continue;
            }
            if !serialize_next(input, &mut current, 0)? {
                break;
            }
        }
        selectors.push(normalize_selector(&current));
        selectors.retain(|s| !s.is_empty());

        if selectors.is_empty() {
            return Err(input.new_custom_error(()));
        }
        Ok(selectors)
    }

    fn parse_block<'t>(
        &mut self,
        selectors: Self::Prelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Item, ParseError<'i, ()>> {
        let mut body = DeclarationListParser;
        let declarations: RuleBodyParser<'_, '_, '_, DeclarationListParser, Declaration, ()> =
            RuleBodyParser::new(input, &mut body);

        Ok(Item::Style(Rule {
            selectors,
            declarations: declarations.filter_map(Result::ok).collect(),
        }))
    }
}

impl<'i> AtRuleParser<'i> for RuleListParser {
    type Prelude = AtPrelude;
    type AtRule = Item;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<AtPrelude, ParseError<'i, ()>> {
        while input.next().is_ok() {}
        let grouping = GROUPING_AT_RULES
            .iter()
            .any(|group| name.eq_ignore_ascii_case(group));
        Ok(if grouping {
            AtPrelude::Group
        } else {
            AtPrelude::Other
        })
    }

    fn rule_without_block(&mut self, _: AtPrelude, _: &ParserState) -> Result<Item, ()> {
        Ok(Item::Skipped)
    }

    fn parse_block<'t>(
        &mut self,
        prelude: AtPrelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Item, ParseError<'i, ()>> {
        match prelude {
            AtPrelude::Group if self.depth < MAX_NESTING => {
                self.depth += 1;
                let rules = collect_rules(input, self);
                self.depth -= 1;
                Ok(Item::Group(rules))
            }
            AtPrelude::Group => {
                debug!(depth = self.depth, "Skipping CSS group nested too deep");
                Ok(Item::Skipped)
            }
            AtPrelude::Other => Ok(Item::Skipped),
        }
    }
}

/// Declarations inside a style rule's block
struct DeclarationListParser;

impl<'i> DeclarationParser<'i> for DeclarationListParser {
    type Declaration = Declaration;
    type Error = ();

    fn parse_value<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Declaration, ParseError<'i, ()>> {
        let mut raw = String::new();
        let mut important = false;
        loop {
            if input.try_parse(important_suffix).is_ok() {
                important = true;
                break;
            }
            if !serialize_next(input, &mut raw, 0)? {
                break;
            }
        }

        let value = collapse_whitespace(&raw);
        if value.is_empty() {
            return Err(input.new_custom_error(()));
        }
        Ok(Declaration {
            property: name.to_ascii_lowercase(),
            value,
            important,
        })
    }
}

impl<'i> AtRuleParser<'i> for DeclarationListParser {
    type Prelude = ();
    type AtRule = Declaration;
    type Error = ();
}

impl<'i> QualifiedRuleParser<'i> for DeclarationListParser {
    type Prelude = ();
    type QualifiedRule = Declaration;
    type Error = ();
}

impl<'i> RuleBodyItemParser<'i, Declaration, ()> for DeclarationListParser {
    fn parse_declarations(&self) -> bool {
        true
    }

    fn parse_qualified(&self) -> bool {
        false
    }
}

fn important_suffix<'i>(input: &mut Parser<'i, '_>) -> Result<(), BasicParseError<'i>> {
    parse_important(input)?;
    input.expect_exhausted()
}

/// Append the next token (and the contents of a block it opens) to `out`;
/// `Ok(false)` once the input is exhausted
fn serialize_next<'i>(
    input: &mut Parser<'i, '_>,
    out: &mut String,
    depth: usize,
) -> Result<bool, ParseError<'i, ()>> {
    let token = match input.next_including_whitespace() {
        Ok(token) => token.clone(),
        Err(_) => return Ok(false),
    };

    let closing = match &token {
        Token::WhiteSpace(_) => {
            out.push(' ');
            return Ok(true);
        }
        Token::Function(_) | Token::ParenthesisBlock => Some(')'),
        Token::SquareBracketBlock => Some(']'),
        Token::CurlyBracketBlock => Some('}'),
        Token::CloseParenthesis
        | Token::CloseSquareBracket
        | Token::CloseCurlyBracket
        | Token::BadString(_)
        | Token::BadUrl(_) => return Err(input.new_custom_error(())),
        _ => None,
    };

    token
        .to_css(out)
        .map_err(|_| input.new_custom_error(()))?;

    if let Some(closing) = closing {
        // deeper blocks are skipped by the tokenizer on the next read
        if depth < MAX_NESTING {
            input.parse_nested_block(|nested| {
                while serialize_next(nested, out, depth + 1)? {}
                Ok::<(), ParseError<'i, ()>>(())
            })?;
        }
        out.push(closing);
    }
    Ok(true)
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical selector text: collapsed whitespace, single spaces around
/// combinators outside brackets and parentheses
pub fn normalize_selector(selector: &str) -> String {
    let mut spaced = String::with_capacity(selector.len() + 8);
    let mut depth = 0usize;
    for c in selector.trim().chars() {
        match c {
            '(' | '[' => {
                depth += 1;
                spaced.push(c);
            }
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                spaced.push(c);
            }
            '>' | '+' | '~' if depth == 0 => {
                spaced.push(' ');
                spaced.push(c);
                spaced.push(' ');
            }
            _ => spaced.push(c),
        }
    }
    collapse_whitespace(&spaced)
}

/// Case-insensitive whole-token match within a declaration value
pub fn value_has_token(value: &str, token: &str) -> bool {
    let token = token.trim().to_ascii_lowercase();
    if token.is_empty() {
        return false;
    }
    value
        .to_ascii_lowercase()
        .split(|c: char| c.is_whitespace() || c == ',' || c == '/')
        .any(|part| part == token)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CENTER: &str =
        ".container { display: flex; justify-content: center; align-items: center; min-height: 100vh; }";

    #[test]
    fn test_parse_single_rule() {
        let sheet = Stylesheet::parse(CENTER);
        assert_eq!(sheet.rules().len(), 1);

        let block = sheet.declarations(".container").unwrap();
        assert_eq!(block.len(), 4);
        assert_eq!(block.get("display"), Some("flex"));
        assert_eq!(block.get("Min-Height"), Some("100vh"));
        assert!(block.has_token("justify-content", "center"));
        assert!(sheet.declarations(".box").is_none());
    }

    #[test]
    fn test_duplicate_selectors_merge_last_write_wins() {
        let css = r#"
            .container { display: block; color: red; }
            .box { width: 200px; }
            .container { display: flex; }
        "#;
        let block = Stylesheet::parse(css).declarations(".container").unwrap();
        assert_eq!(block.get("display"), Some("flex"));
        assert_eq!(block.get("color"), Some("red"));
        let order: Vec<_> = block.iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec!["display", "color"]);
    }

    #[test]
    fn test_important_survives_later_plain_declaration() {
        let css = r#"
            .container { display: flex !important; color: red; }
            .container { display: block; color: blue; }
        "#;
        let block = Stylesheet::parse(css).declarations(".container").unwrap();
        assert_eq!(block.get("display"), Some("flex"));
        assert_eq!(block.get("color"), Some("blue"));

        let block = Stylesheet::parse(".a { display: block !important; } .a { display: grid !important; }")
            .declarations(".a")
            .unwrap();
        assert_eq!(block.get("display"), Some("grid"));
    }

    #[test]
    fn test_comments_and_strings() {
        let css = r#"
            /* .container { display: none; } */
            .container {
                /* Add your CSS here */
                content: "a; b } c";
                display: flex;
            }
        "#;
        let sheet = Stylesheet::parse(css);
        assert_eq!(sheet.rules().len(), 1);
        let block = sheet.declarations(".container").unwrap();
        assert_eq!(block.get("content"), Some("\"a; b } c\""));
        assert_eq!(block.get("display"), Some("flex"));
    }

    #[test]
    fn test_starter_block_is_empty_but_present() {
        let sheet = Stylesheet::parse(".navbar {\n  /* Add your CSS here */\n}");
        let block = sheet.declarations(".navbar").unwrap();
        assert!(block.is_empty());
    }

    #[test]
    fn test_selector_lists_and_normalization() {
        let css = ".navbar   a,.navbar>.brand { color: white; }";
        let sheet = Stylesheet::parse(css);
        assert!(sheet.declarations(".navbar a").is_some());
        assert!(sheet.declarations(".navbar > .brand").is_some());
        assert!(sheet.declarations(".navbar").is_none());
    }

    #[test]
    fn test_media_rules_are_kept_and_font_face_skipped() {
        let css = r#"
            @import url("theme.css");
            @font-face { font-family: Foo; src: url(foo.woff); }
            @media (max-width: 600px) {
                .navbar { padding: 0.5rem; }
            }
            .navbar { display: flex; }
        "#;
        let sheet = Stylesheet::parse(css);
        assert_eq!(sheet.rules().len(), 2);
        let block = sheet.declarations(".navbar").unwrap();
        assert_eq!(block.get("padding"), Some("0.5rem"));
        assert_eq!(block.get("display"), Some("flex"));
        assert!(!block.contains("font-family"));
    }

    #[test]
    fn test_deeply_nested_groups_are_skipped() {
        let shallow = format!("{}.box {{ color: red; }}{}", "@media screen {".repeat(3), "}".repeat(3));
        let sheet = Stylesheet::parse(&shallow);
        assert_eq!(sheet.declarations(".box").unwrap().get("color"), Some("red"));

        let deep = format!(
            "{}.box {{ color: red; }}{}.top {{ color: blue; }}",
            "@media screen {".repeat(MAX_NESTING + 5),
            "}".repeat(MAX_NESTING + 5)
        );
        let sheet = Stylesheet::parse(&deep);
        assert!(sheet.declarations(".box").is_none());
        assert_eq!(sheet.declarations(".top").unwrap().get("color"), Some("blue"));
    }

    #[test]
    fn test_unclosed_group_flood_does_not_overflow() {
        let sheet = Stylesheet::parse(&"@media{".repeat(10_000));
        assert!(sheet.rules().is_empty());

        let sheet = Stylesheet::parse(&format!(".a {{ width: {} }}", "calc(".repeat(10_000)));
        assert!(sheet.declarations(".a").is_some());
    }

    #[test]
    fn test_important_and_malformed() {
        let css = ".a { color: red !IMPORTANT; nonsense; : empty; width:; background : url(a;b.png) }";
        let sheet = Stylesheet::parse(css);
        let rule = &sheet.rules()[0];
        assert_eq!(rule.declarations.len(), 2);
        assert_eq!(rule.declarations[0].value, "red");
        assert!(rule.declarations[0].important);
        assert_eq!(rule.declarations[1].value, "url(a;b.png)");
        assert!(!rule.declarations[1].important);
    }

    #[test]
    fn test_token_matching() {
        assert!(value_has_token("flex", "flex"));
        assert!(value_has_token("1rem 2rem", "2rem"));
        assert!(value_has_token("Space-Between", "space-between"));
        assert!(!value_has_token("inline-flex", "flex"));
        assert!(!value_has_token("center", ""));
    }

    #[test]
    fn test_unterminated_input_does_not_panic() {
        let sheet = Stylesheet::parse(".container { display: flex;");
        assert_eq!(sheet.declarations(".container").unwrap().get("display"), Some("flex"));
        assert!(Stylesheet::parse(".container").rules().is_empty());
        assert!(Stylesheet::parse("}}} {").rules().is_empty());
    }
}
