//! Executor：逐语句的五趟即时求值
//!
//! 外层循环下标就是程序计数器，goto 直接改写它。每条语句先整体复制进
//! 工作缓冲再求值，原程序永不改动，同一程序可以反复 run。五趟内循环：
//!
//! 0 正向：琐碎语句、break/goto、赋值判定、变量与引用替换
//! 1 反向：数学运算符归约
//! 2 反向：字符串运算符归约
//! 3 反向：比较运算符归约
//! 4 正向：赋值写出、条件 if 的跳过扫描
//!
//! 反向归约意味着运算符右结合，`a - b - c` 按 `a - (b - c)` 算。

use tracing::{debug, trace};

use crate::engine::Kabap;
use crate::error::{ErrorKind, ScriptError};
use crate::extension::ReferenceMessageType;
use crate::number;
use crate::token::{
    Program, Statement, Token, TokenKind, OPERATORS_COMPARATOR, OPERATORS_MATHEMATICAL,
    OPERATORS_STRING,
};

/// 归约趟处理的运算符类别
#[derive(Clone, Copy, PartialEq)]
enum OperatorClass {
    Mathematical,
    Strings,
    Comparators,
}

impl OperatorClass {
    fn contains(self, op: &str) -> bool {
        match self {
            OperatorClass::Mathematical => OPERATORS_MATHEMATICAL.contains(&op),
            OperatorClass::Strings => OPERATORS_STRING.contains(&op),
            OperatorClass::Comparators => OPERATORS_COMPARATOR.contains(&op),
        }
    }
}

impl Kabap {
    pub(crate) fn execute_program(&mut self) -> Result<(), ScriptError> {
        let program = self.program.clone().unwrap_or_default();
        debug!(target: "kabap::executor", statements = program.len(), "executing program");

        let mut ticks: i64 = 0;
        let mut i = 0;

        while i < program.statements.len() {
            // 防止无限 goto 循环跑飞
            ticks += 1;
            if ticks == i64::from(self.watchdog) && self.watchdog > 0 {
                return Err(self.err(ErrorKind::WatchdogTimeout(ticks)));
            }

            // 语句复制进工作缓冲，原程序保持原样
            let mut stmt: Statement = program.statements[i].clone();
            trace!(target: "kabap::executor", statement = i, tokens = stmt.len(), "statement");

            // ==================== 第 0 趟（正向）====================

            if stmt.len() == 1 && stmt[0].kind == TokenKind::LineHint {
                self.line = stmt[0].value.parse().unwrap_or(self.line);
                i += 1;
                continue;
            }
            if stmt.len() == 1 && stmt[0].kind == TokenKind::Label {
                i += 1;
                continue;
            }

            if stmt[0].kind == TokenKind::Flow {
                if stmt[0].value == "break" {
                    if stmt.len() > 1 {
                        return Err(self.err(ErrorKind::TokensAfterBreak));
                    }
                    return Ok(());
                }
                if stmt[0].value == "goto" {
                    if stmt.len() < 2 || stmt[1].kind != TokenKind::Reference {
                        return Err(self.err(ErrorKind::ExpectedLabelAfterGoto));
                    }
                    if stmt.len() > 2 {
                        return Err(self.err(ErrorKind::TokensAfterLabel));
                    }
                    let target = stmt[1].value.to_lowercase();
                    match program.labels.get(&target) {
                        Some(&index) => {
                            i = index + 1;
                            continue;
                        }
                        None => {
                            return Err(self.err(ErrorKind::UnknownLabel(stmt[1].value.clone())))
                        }
                    }
                }
            }

            // 赋值判定：唯一一个 = 必须在下标 1，左边是变量或引用
            let mut assignment = false;
            let mut eq_index = None;
            for (m, token) in stmt.iter().enumerate() {
                if token.kind == TokenKind::Operator && token.value == "=" {
                    if eq_index.is_some() {
                        return Err(self.err(ErrorKind::MultipleAssignments));
                    }
                    eq_index = Some(m);
                    assignment = true;
                }
            }
            if assignment {
                if eq_index != Some(1) {
                    return Err(self.err(ErrorKind::AssignmentLeftCount));
                }
                if stmt.len() < 3 {
                    return Err(self.err(ErrorKind::AssignmentMissingRight));
                }
                if stmt[0].kind != TokenKind::Variable && stmt[0].kind != TokenKind::Reference {
                    return Err(self.err(ErrorKind::AssignmentLeftKind));
                }
            }

            // 变量与引用从左到右替换成各自的值；赋值时跳过 LValue 和 =
            let start = if assignment { 2 } else { 0 };
            for m in start..stmt.len() {
                if assignment
                    && !matches!(
                        stmt[m].kind,
                        TokenKind::Operator
                            | TokenKind::Variable
                            | TokenKind::String
                            | TokenKind::Number
                            | TokenKind::Reference
                    )
                {
                    return Err(self.err(ErrorKind::AssignmentContains(stmt[m].kind)));
                }

                match stmt[m].kind {
                    TokenKind::Variable => {
                        let key = stmt[m].value.to_lowercase();
                        match self.variables.get(&key) {
                            Some(value) => stmt[m] = Token::new(TokenKind::String, value.clone()),
                            None => {
                                return Err(self.err(ErrorKind::UndefinedVariable(
                                    stmt[m].value.clone(),
                                )))
                            }
                        }
                    }
                    TokenKind::Reference => {
                        if stmt[m].value.to_lowercase() == "return" {
                            return Err(self.err(if assignment {
                                ErrorKind::ReadFromReturn
                            } else {
                                ErrorKind::CallFromReturn
                            }));
                        }
                        let name = stmt[m].value.clone();
                        let value =
                            self.dispatch_reference(ReferenceMessageType::Read, &name, None)?;
                        stmt[m] = Token::new(TokenKind::String, value);
                    }
                    _ => {}
                }
            }

            // ==================== 第 1-3 趟（反向归约）====================

            self.reduce(&mut stmt, assignment, OperatorClass::Mathematical)?;
            self.reduce(&mut stmt, assignment, OperatorClass::Strings)?;
            self.reduce(&mut stmt, assignment, OperatorClass::Comparators)?;

            // ==================== 第 4 趟（正向）====================

            if assignment {
                if stmt.len() > 3 {
                    return Err(self.err(ErrorKind::AssignmentRightCount));
                }
                let rvalue = stmt[2].value.clone();
                match stmt[0].kind {
                    TokenKind::Variable => {
                        self.variables.insert(stmt[0].value.to_lowercase(), rvalue);
                    }
                    TokenKind::Reference => {
                        if stmt[0].value.to_lowercase() == "return" {
                            self.stdout = rvalue;
                        } else {
                            let name = stmt[0].value.clone();
                            self.dispatch_reference(
                                ReferenceMessageType::Write,
                                &name,
                                Some(&rvalue),
                            )?;
                        }
                    }
                    _ => {}
                }
            }

            if stmt[0].kind == TokenKind::Flow && stmt[0].value == "if" {
                if stmt.len() < 2 {
                    return Err(self.err(ErrorKind::MissingIfCondition));
                }
                if stmt.len() > 2 {
                    return Err(self.err(ErrorKind::MultipleIfConditions));
                }
                if matches!(
                    stmt[1].kind,
                    TokenKind::Flow | TokenKind::BlockStart | TokenKind::BlockEnd
                ) {
                    return Err(self.err(ErrorKind::IfConditionContains(stmt[1].kind)));
                }

                if number::extract(&stmt[1].value, 0.0) == 0.0 {
                    i = self.skip_conditional(&program, i)? + 1;
                    continue;
                }
            }

            i += 1;
        }

        Ok(())
    }

    /// 反向归约一类运算符
    ///
    /// 趟开始时抓一次长度，归约途中不刷新，右操作数缺失的判定以这个
    /// 长度为准。
    fn reduce(
        &mut self,
        stmt: &mut Statement,
        assignment: bool,
        class: OperatorClass,
    ) -> Result<(), ScriptError> {
        let n = stmt.len() as isize;
        let mut m = n - 1;

        while m > -1 {
            let idx = m as usize;
            if stmt[idx].kind == TokenKind::Operator && class.contains(&stmt[idx].value) {
                let op = stmt[idx].value.clone();
                let unary = op == "++" || op == "--";

                if m == if assignment { 2 } else { 0 } {
                    return Err(self.err(ErrorKind::MissingLeftOperand(op)));
                }
                if m + 1 == n && !unary {
                    return Err(self.err(ErrorKind::MissingRightOperand(op)));
                }

                let left = idx - 1;
                if stmt[left].kind != TokenKind::String && stmt[left].kind != TokenKind::Number {
                    return Err(self.err(ErrorKind::LeftOperandKind(stmt[left].kind)));
                }
                if !unary
                    && stmt[idx + 1].kind != TokenKind::String
                    && stmt[idx + 1].kind != TokenKind::Number
                {
                    return Err(self.err(ErrorKind::RightOperandKind(stmt[idx + 1].kind)));
                }

                if class == OperatorClass::Strings {
                    // << 按字面拼接
                    let right = stmt.remove(idx + 1);
                    stmt[left].kind = TokenKind::String;
                    stmt[left].value.push_str(&right.value);
                    stmt.remove(idx);
                } else {
                    let right = if unary {
                        None
                    } else {
                        Some(stmt[idx + 1].value.clone())
                    };
                    let result = self.apply_operator(&op, &stmt[left].value, right.as_deref());
                    stmt[left] = Token::new(TokenKind::Number, result);
                    if !unary {
                        stmt.remove(idx + 1);
                    }
                    stmt.remove(idx);
                }

                // 归约结果当操作数用，跳过它
                m -= 1;
            }
            m -= 1;
        }

        Ok(())
    }

    /// 单个数学或比较运算
    fn apply_operator(&self, op: &str, left: &str, right: Option<&str>) -> String {
        // 相等性是大小写无关的字符串比较，不走数值
        if op == "==" || op == "!=" {
            let equal = left.to_lowercase() == right.unwrap_or_default().to_lowercase();
            let truth = equal == (op == "==");
            return if truth { "1" } else { "0" }.to_string();
        }

        let l = number::extract(left, 0.0);
        let r = match op {
            "++" => 1.0,
            "--" => -1.0,
            _ => number::extract(right.unwrap_or_default(), 0.0),
        };

        match op {
            "+" | "++" | "--" => self.number_format(l + r),
            "-" => self.number_format(l - r),
            "*" => self.number_format(l * r),
            "/" => {
                if r == 0.0 {
                    // 除零给 0，脚本作者不需要除零错误
                    "0".to_string()
                } else {
                    self.number_format(l / r)
                }
            }
            "%" => self.number_format(l % r),
            "^" => self.number_format(l.powf(r)),
            "<" => bool_value(l < r),
            "<=" => bool_value(l <= r),
            ">=" => bool_value(l >= r),
            ">" => bool_value(l > r),
            _ => String::new(),
        }
    }

    /// 假 if 的跳过扫描：数块嵌套找到守护范围的结束
    ///
    /// 块形式落在配对 BlockEnd 语句上，裸形式落在被守护的单条语句上，
    /// 调用方再 +1 继续执行。
    fn skip_conditional(&self, program: &Program, from: usize) -> Result<usize, ScriptError> {
        let mut nests = 0i32;
        let mut m = from + 1;

        while m < program.statements.len() {
            let first = &program.statements[m][0];

            if first.kind == TokenKind::LineHint
                || (nests == 0 && first.kind == TokenKind::Flow && first.value == "if")
            {
                m += 1;
                continue;
            }

            if first.kind == TokenKind::BlockStart {
                nests += 1;
            } else if first.kind == TokenKind::BlockEnd {
                nests -= 1;
            }

            if nests == 0 {
                return Ok(m);
            }
            m += 1;
        }

        Err(self.err(ErrorKind::UnterminatedConditionalBlock))
    }

    fn dispatch_reference(
        &mut self,
        message_type: ReferenceMessageType,
        name: &str,
        value: Option<&str>,
    ) -> Result<String, ScriptError> {
        let line = self.line;
        self.extensions
            .dispatch(message_type, name, value)
            .map_err(|kind| ScriptError::new(line, kind))
    }

    pub(crate) fn number_format(&self, value: f64) -> String {
        number::format(value, self.scale.get())
    }

    pub(crate) fn err(&self, kind: ErrorKind) -> ScriptError {
        ScriptError::new(self.line, kind)
    }
}

fn bool_value(truth: bool) -> String {
    if truth { "1" } else { "0" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> (bool, String, String) {
        let mut engine = Kabap::new();
        assert!(engine.script(source), "parse failed: {}", engine.stderr());
        let ok = engine.run();
        (ok, engine.stdout().to_string(), engine.stderr().to_string())
    }

    fn run_err(source: &str) -> String {
        let (ok, _, stderr) = run(source);
        assert!(!ok);
        stderr
    }

    fn run_out(source: &str) -> String {
        let (ok, stdout, stderr) = run(source);
        assert!(ok, "run failed: {stderr}");
        stdout
    }

    #[test]
    fn test_addition() {
        assert_eq!(run_out("return = 2+2;"), "4");
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(run_out("return = \"a\" << \"b\" << 1;"), "ab1");
    }

    #[test]
    fn test_right_to_left_association() {
        // 反向归约：10 - (4 - 2)
        assert_eq!(run_out("return = 10 - 4 - 2;"), "8");
    }

    #[test]
    fn test_unary_increment() {
        assert_eq!(run_out("$n = 5; $n = $n ++; return = $n;"), "6");
        assert_eq!(run_out("$n = 5; $n = $n --; return = $n;"), "4");
    }

    #[test]
    fn test_division_by_zero_yields_zero() {
        assert_eq!(run_out("return = 1/0;"), "0");
    }

    #[test]
    fn test_power_and_modulo() {
        assert_eq!(run_out("return = 2 ^ 10;"), "1024");
        assert_eq!(run_out("return = 10 % 3;"), "1");
    }

    #[test]
    fn test_scale_formatting() {
        assert_eq!(run_out("return = 10 / 3;"), "3.333");
        assert_eq!(run_out("kabap.scale = 1; return = 10 / 3;"), "3.3");
    }

    #[test]
    fn test_equality_case_insensitive() {
        assert_eq!(run_out("return = \"Foo\" == \"foo\";"), "1");
        assert_eq!(run_out("return = \"Foo\" != \"foo\";"), "0");
        assert_eq!(run_out("return = \"a\" == \"b\";"), "0");
    }

    #[test]
    fn test_comparators_numeric() {
        assert_eq!(run_out("return = 2 < 10;"), "1");
        assert_eq!(run_out("return = 2 >= 10;"), "0");
        // 字符串按数值比较时当 0
        assert_eq!(run_out("return = \"abc\" < 1;"), "1");
    }

    #[test]
    fn test_variables_are_lowercase_for_scripts() {
        let mut engine = Kabap::new();
        assert!(engine.script("$X = 5; return = $x;"));
        assert!(engine.run());
        assert_eq!(engine.stdout(), "5");
        assert_eq!(engine.variable_get("x"), Some("5"));
    }

    #[test]
    fn test_undefined_variable() {
        assert_eq!(run_err("return = $nope;"), "Line 1: Undefined variable: nope");
    }

    #[test]
    fn test_if_true_executes_guarded_statement() {
        assert_eq!(run_out("$s = 12; if $s > 10; $s = 10; return = $s;"), "10");
    }

    #[test]
    fn test_if_false_skips_guarded_statement() {
        assert_eq!(run_out("$s = 5; if $s > 10; $s = 10; return = $s;"), "5");
    }

    #[test]
    fn test_if_false_skips_block() {
        let source = "$s = 5;\nif $s > 10;\n{\n$s = 10;\n$s = 11;\n}\nreturn = $s;";
        assert_eq!(run_out(source), "5");
    }

    #[test]
    fn test_if_true_enters_block() {
        let source = "$s = 50;\nif $s > 10;\n{\n$s = 10;\n}\nreturn = $s;";
        assert_eq!(run_out(source), "10");
    }

    #[test]
    fn test_nested_if_skip() {
        let source = "$s = 5;\nif $s > 10;\n{\nif $s > 1;\n{\n$s = 99;\n}\n}\nreturn = $s;";
        assert_eq!(run_out(source), "5");
    }

    #[test]
    fn test_goto_loop() {
        let mut engine = Kabap::new();
        assert!(engine.script(":loop\n$n = $n + 1;\nif $n < 3;\ngoto loop;\nreturn = $n;"));
        engine.variable_set("n", "0");
        assert!(engine.run(), "{}", engine.stderr());
        assert_eq!(engine.stdout(), "3");
    }

    #[test]
    fn test_break_stops_execution() {
        assert_eq!(run_out("return = 1; break; return = 2;"), "1");
    }

    #[test]
    fn test_break_with_trailing_tokens() {
        assert_eq!(run_err("break 1;"), "Line 1: Nothing can be after break");
    }

    #[test]
    fn test_goto_errors() {
        assert_eq!(run_err("goto;"), "Line 1: Expected label after goto");
        assert_eq!(run_err(":a;\ngoto a 1;"), "Line 2: Nothing can be after label");
        assert_eq!(run_err("goto nowhere;"), "Line 1: Unknown label: nowhere");
    }

    #[test]
    fn test_watchdog_fires() {
        let mut engine = Kabap::new();
        assert!(engine.script(":loop\ngoto loop;"));
        engine.watchdog_set(10);
        assert!(!engine.run());
        assert_eq!(engine.stderr(), "Line 2: Watchdog 10 ticks timeout, execution break");
    }

    #[test]
    fn test_watchdog_zero_disables() {
        let mut engine = Kabap::new();
        assert!(engine.script(":loop\n$n = $n + 1;\nif $n < 5000;\ngoto loop;\nreturn = $n;"));
        engine.variable_set("n", "0");
        engine.watchdog_set(0);
        assert!(engine.run(), "{}", engine.stderr());
        assert_eq!(engine.stdout(), "5000");
    }

    #[test]
    fn test_assignment_errors() {
        assert_eq!(run_err("$a = 1 = 2;"), "Line 1: Only 1 assignment can be in a statement");
        assert_eq!(run_err("$a $b = 1;"), "Line 1: Assignment expects 1 left-hand value");
        assert_eq!(
            run_err("1 = 2;"),
            "Line 1: Assignment left-hand value must be a variable or reference"
        );
        assert_eq!(run_err("$a =;"), "Line 1: Assignment expects a right-hand value");
        assert_eq!(run_err("$a = 1 2;"), "Line 1: Assignment takes only one right-hand value");
    }

    #[test]
    fn test_assignment_cannot_contain_block() {
        assert_eq!(
            run_err("$a = {\n}"),
            "Line 1: Assignment cannot contain a blockstart"
        );
    }

    #[test]
    fn test_operand_errors() {
        assert_eq!(
            run_err("return = + 1;"),
            "Line 1: Missing left-hand operand before operator: +"
        );
        assert_eq!(
            run_err("return = 1 +;"),
            "Line 1: Missing right-hand operand after operator: +"
        );
    }

    #[test]
    fn test_return_cannot_be_read() {
        assert_eq!(run_err("$a = return;"), "Line 1: Cannot read from a return");
        assert_eq!(run_err("return;"), "Line 1: Cannot call from a return");
    }

    #[test]
    fn test_if_condition_errors() {
        assert_eq!(run_err("if 1 2;\n$a = 1;"), "Line 1: Only 1 if condition can be evaluated");
    }

    #[test]
    fn test_line_numbers_in_errors() {
        assert_eq!(
            run_err("$a = 1;\n$b = $missing;"),
            "Line 2: Undefined variable: missing"
        );
    }

    #[test]
    fn test_builtin_version_readable() {
        assert_eq!(run_out("return = kabap.version;"), "1.0");
    }

    #[test]
    fn test_builtin_scale_read_write() {
        assert_eq!(run_out("kabap.scale = 2; return = kabap.scale;"), "2");
    }

    #[test]
    fn test_reference_not_found() {
        assert_eq!(
            run_err("return = no.body;"),
            "Line 1: Reference not found: no.body"
        );
    }

    #[test]
    fn test_statement_copies_keep_program_reusable() {
        let mut engine = Kabap::new();
        assert!(engine.script("$n = $n + 1; return = $n;"));
        engine.variable_set("n", "0");
        assert!(engine.run());
        assert_eq!(engine.stdout(), "1");
        assert!(engine.run());
        assert_eq!(engine.stdout(), "2");
    }
}
