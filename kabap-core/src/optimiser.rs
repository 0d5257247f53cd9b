//! Optimiser：对 token 流的分级改写
//!
//! 0 = 不动；1 = 预留给字面量折叠；2 = 丢弃行提示；3 = 变量/标签/跳转
//! 目标改成生成的短名（完全最小化）。高等级包含低等级。

use std::collections::HashMap;

use tracing::debug;

use crate::error::ErrorKind;
use crate::token::{Program, TokenKind};

pub(crate) fn optimise(program: &mut Program, level: i32) -> Result<(), ErrorKind> {
    if !(0..=3).contains(&level) {
        return Err(ErrorKind::OptimiseLevelOutOfBounds);
    }
    if level == 0 {
        return Ok(());
    }

    // 等级 1 预留给字面量折叠，目前没有事做

    if level >= 2 {
        for k in (0..program.statements.len()).rev() {
            program.statements[k].retain(|t| t.kind != TokenKind::LineHint);
            if program.statements[k].is_empty() {
                program.statements.remove(k);
                // 语句下标收缩，标签指针跟着回落
                for target in program.labels.values_mut() {
                    if *target >= k {
                        *target -= 1;
                    }
                }
            }
        }
    }

    if level >= 3 {
        let mut minified: HashMap<String, String> = HashMap::new();

        for k in 0..program.statements.len() {
            for m in (0..program.statements[k].len()).rev() {
                let kind = program.statements[k][m].kind;
                let goto_target = m > 0
                    && kind == TokenKind::Reference
                    && program.statements[k][m - 1].kind == TokenKind::Flow
                    && program.statements[k][m - 1].value == "goto";

                if kind == TokenKind::Variable || kind == TokenKind::Label || goto_target {
                    // 变量用 $ 键入查找表，标签和跳转目标共用 : 键
                    let sigil = if kind == TokenKind::Variable { '$' } else { ':' };
                    let key = format!("{sigil}{}", program.statements[k][m].value);
                    let next = minified.len();
                    let short = minified
                        .entry(key)
                        .or_insert_with(|| index_to_name(next))
                        .clone();
                    program.statements[k][m].value = short;
                }
            }
        }

        // 用短名重建标签表
        let mut labels = HashMap::new();
        for (key, short) in &minified {
            if let Some(name) = key.strip_prefix(':') {
                if let Some(&target) = program.labels.get(name) {
                    labels.insert(short.clone(), target);
                }
            }
        }
        program.labels = labels;
    }

    debug!(
        target: "kabap::optimiser",
        level,
        statements = program.statements.len(),
        "optimise complete"
    );

    Ok(())
}

/// 下标转电子表格式列名：a..z, aa..az, ba..
fn index_to_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'a' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    name.into_iter().map(char::from).collect()
}
