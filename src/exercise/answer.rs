//! 结构化答案与旧版字符串格式
//!
//! 旧版把答案存成无 schema 的字符串：
//!
//! | 题型 | 格式 | 例子 |
//! | --- | --- | --- |
//! | 单选 | 选项下标 | `2` |
//! | 填空 | 原文 | `går` |
//! | 连线 | 逗号分隔的 `{左:右}` | `{0:1},{1:0}` |
//! | 文章 | `|` 分隔的子题答案 | `0|22684|København` |
//!
//! 进度表和缓存里保存的仍是这种格式，这里负责双向转换。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{ArticleSubExercise, ExerciseKind};

/// 一次作答
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Answer {
    /// 单选：所选下标
    Selected(usize),
    /// 填空：输入文字
    Text(String),
    /// 连线：左侧下标 -> 右侧下标
    Pairs(BTreeMap<usize, usize>),
    /// 文章：按子题顺序的答案
    Article(Vec<SubAnswer>),
}

/// 文章子题的答案
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SubAnswer {
    Selected(usize),
    Text(String),
}

impl Answer {
    /// 按题型解析旧版答案字符串
    ///
    /// 单选与连线格式不合法时返回 `None`；填空和文章总能解析。
    /// 文章中单选子题的非数字答案保留为文字，判题时自然判错。
    pub fn parse_legacy(kind: &ExerciseKind, raw: &str) -> Option<Self> {
        match kind {
            ExerciseKind::MultipleChoice { .. } => raw.parse().ok().map(Answer::Selected),
            ExerciseKind::FillInBlank { .. } => Some(Answer::Text(raw.to_string())),
            ExerciseKind::MatchPairs { .. } => parse_legacy_pairs(raw).map(Answer::Pairs),
            ExerciseKind::Article { sub_exercises } => Some(Answer::Article(
                raw.split('|')
                    .enumerate()
                    .map(|(i, part)| match sub_exercises.get(i) {
                        Some(ArticleSubExercise::MultipleChoice { .. }) => part
                            .parse()
                            .map(SubAnswer::Selected)
                            .unwrap_or_else(|_| SubAnswer::Text(part.to_string())),
                        _ => SubAnswer::Text(part.to_string()),
                    })
                    .collect(),
            )),
        }
    }

    /// 编码为旧版字符串
    pub fn to_legacy(&self) -> String {
        match self {
            Answer::Selected(index) => index.to_string(),
            Answer::Text(text) => text.clone(),
            Answer::Pairs(pairs) => pairs
                .iter()
                .map(|(left, right)| format!("{{{left}:{right}}}"))
                .collect::<Vec<_>>()
                .join(","),
            Answer::Article(answers) => answers
                .iter()
                .map(SubAnswer::to_legacy)
                .collect::<Vec<_>>()
                .join("|"),
        }
    }

    /// 编码为旧版字符串，且保证按同一题型能原样解析回来
    ///
    /// 文章子题的文字含 `|`、答案形态与题型不符、空的连线答案都无法无损保存，返回 `None`。
    pub fn encode_legacy(&self, kind: &ExerciseKind) -> Option<String> {
        let encoded = self.to_legacy();
        (Answer::parse_legacy(kind, &encoded).as_ref() == Some(self)).then_some(encoded)
    }
}

impl SubAnswer {
    pub fn to_legacy(&self) -> String {
        match self {
            SubAnswer::Selected(index) => index.to_string(),
            SubAnswer::Text(text) => text.clone(),
        }
    }
}

/// 解析 `{0:1},{1:0}`
///
/// 每段去掉首尾空白，成对的花括号可省略，冒号后多余的部分忽略；
/// 同一左侧下标出现多次时后者生效。
fn parse_legacy_pairs(raw: &str) -> Option<BTreeMap<usize, usize>> {
    let mut pairs = BTreeMap::new();

    for token in raw.split(',') {
        let token = token.trim();
        let inner = token
            .strip_prefix('{')
            .and_then(|t| t.strip_suffix('}'))
            .unwrap_or(token);

        let mut parts = inner.split(':');
        let left = parts.next()?.parse().ok()?;
        let right = parts.next()?.parse().ok()?;
        pairs.insert(left, right);
    }

    Some(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercise::fixtures::{article, match_pairs, multiple_choice};
    use proptest::prelude::*;

    #[test]
    fn test_parse_legacy_pairs() {
        let parsed = parse_legacy_pairs("{0:1},{1:0}").unwrap();
        assert_eq!(parsed, BTreeMap::from([(0, 1), (1, 0)]));

        // 省略花括号、带空格
        let parsed = parse_legacy_pairs(" 0:1 , {1:0}").unwrap();
        assert_eq!(parsed, BTreeMap::from([(0, 1), (1, 0)]));

        // 重复键后者生效
        let parsed = parse_legacy_pairs("{0:1},{0:2}").unwrap();
        assert_eq!(parsed, BTreeMap::from([(0, 2)]));
    }

    #[test]
    fn test_parse_legacy_pairs_malformed() {
        for raw in ["garbage", "", "{}", "{0}", "{0:x}", "{a:1}", "{0:1},", "{-1:0}"] {
            assert!(parse_legacy_pairs(raw).is_none(), "{raw:?} should not parse");
        }
    }

    #[test]
    fn test_pairs_legacy_round_trip() {
        let kind = match_pairs("ex", &[(0, 2), (1, 0), (2, 1)]).kind;
        let answer = Answer::Pairs(BTreeMap::from([(0, 2), (1, 0), (2, 1)]));

        assert_eq!(answer.to_legacy(), "{0:2},{1:0},{2:1}");
        assert_eq!(Answer::parse_legacy(&kind, &answer.to_legacy()), Some(answer));
    }

    #[test]
    fn test_parse_legacy_multiple_choice() {
        let kind = multiple_choice("ex", 1).kind;
        assert_eq!(Answer::parse_legacy(&kind, "3"), Some(Answer::Selected(3)));
        assert_eq!(Answer::parse_legacy(&kind, " 3"), None);
        assert_eq!(Answer::parse_legacy(&kind, "tre"), None);
    }

    #[test]
    fn test_parse_legacy_article() {
        let kind = article("ex", "art_001").kind;

        let parsed = Answer::parse_legacy(&kind, "0|22684|København").unwrap();
        assert_eq!(
            parsed,
            Answer::Article(vec![
                SubAnswer::Selected(0),
                SubAnswer::Text("22684".to_string()),
                SubAnswer::Text("København".to_string()),
            ])
        );
        assert_eq!(parsed.to_legacy(), "0|22684|København");

        // 未作答的单选子题保留为空文字
        let parsed = Answer::parse_legacy(&kind, "||").unwrap();
        assert_eq!(
            parsed,
            Answer::Article(vec![
                SubAnswer::Text(String::new()),
                SubAnswer::Text(String::new()),
                SubAnswer::Text(String::new()),
            ])
        );
    }

    #[test]
    fn test_encode_legacy_rejects_lossy_answers() {
        let kind = article("ex", "art_001").kind;

        // 文字里的 `|` 会被当成子题分隔符
        let piped = Answer::Article(vec![
            SubAnswer::Selected(0),
            SubAnswer::Text("22|684".to_string()),
            SubAnswer::Text("København".to_string()),
        ]);
        assert_eq!(piped.encode_legacy(&kind), None);

        // 单选子题给了文字，存回去会变成下标
        let mistyped = Answer::Article(vec![
            SubAnswer::Text("0".to_string()),
            SubAnswer::Text("22684".to_string()),
            SubAnswer::Text("København".to_string()),
        ]);
        assert_eq!(mistyped.encode_legacy(&kind), None);

        let fine = Answer::Article(vec![
            SubAnswer::Selected(0),
            SubAnswer::Text("22684".to_string()),
            SubAnswer::Text("København".to_string()),
        ]);
        assert_eq!(fine.encode_legacy(&kind).as_deref(), Some("0|22684|København"));

        let pairs_kind = match_pairs("ex", &[(0, 1), (1, 0)]).kind;
        assert_eq!(Answer::Pairs(BTreeMap::new()).encode_legacy(&pairs_kind), None);
        assert_eq!(Answer::Text("1".to_string()).encode_legacy(&multiple_choice("ex", 1).kind), None);
    }

    proptest! {
        #[test]
        fn prop_encoded_article_answer_grades_like_typed(
            choice in 0usize..3,
            first in "[a-zA-Z0-9|ø ]{0,10}",
            second in "[a-zA-Z0-9|ø ]{0,10}",
        ) {
            let exercise = article("ex", "art_001");
            let answer = Answer::Article(vec![
                SubAnswer::Selected(choice),
                SubAnswer::Text(first),
                SubAnswer::Text(second),
            ]);

            if let Some(encoded) = answer.encode_legacy(&exercise.kind) {
                prop_assert_eq!(
                    Answer::parse_legacy(&exercise.kind, &encoded),
                    Some(answer.clone())
                );
                prop_assert_eq!(exercise.check_answer(&encoded), exercise.check(&answer));
            }
        }
    }

    #[test]
    fn test_answer_json_shape() {
        let json = serde_json::to_string(&Answer::Selected(2)).unwrap();
        assert_eq!(json, r#"{"type":"selected","value":2}"#);

        let answer: Answer =
            serde_json::from_str(r#"{"type":"article","value":[{"type":"text","value":"ja"}]}"#)
                .unwrap();
        assert_eq!(answer, Answer::Article(vec![SubAnswer::Text("ja".to_string())]));
    }
}
