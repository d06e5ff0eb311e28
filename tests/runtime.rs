//! Integration tests for the runtime session: the three-phase refresh,
//! fail-open evaluation, interpolation, repeat loops, and terminal steps.

#[cfg(test)]
mod verify {
    use stepwise::language::{Block, BlockKind, Value};
    use stepwise::parsing;
    use stepwise::runtime::Session;

    fn trim(s: &str) -> &str {
        s.strip_prefix('\n')
            .unwrap_or(s)
    }

    fn session(source: &str) -> Session {
        let procedure = parsing::compile(source).expect("document should compile");
        Session::new(procedure)
    }

    fn find_conditional(blocks: &[Block]) -> &Block {
        blocks
            .iter()
            .find(|block| matches!(block.kind, BlockKind::Conditional { .. }))
            .expect("a conditional block")
    }

    #[test]
    fn unknown_dependency_fails_open() {
        let mut session = session(trim(
            r#"
{showif unknownVar == 1}
maybe shown
{}
            "#,
        ));

        session.refresh(0);

        // the conditional depends on nothing we know about, so it shows
        let id = find_conditional(&session.procedure().steps[0].blocks).id;
        assert!(session.is_visible(id));
    }

    #[test]
    fn unknown_dependency_keeps_a_loop_repeating() {
        let mut session = session("some step\n{RepeatStep Until unknownVar == 1}");

        session.refresh(0);
        assert!(!session.repeat_satisfied(0));
    }

    #[test]
    fn answers_drive_conditionals() {
        let mut session = session(trim(
            r#"
Q: Name?[name]
---
{showif name=="Bob"}
Hi Bob
{}
            "#,
        ));

        session.refresh(1);
        let id = find_conditional(&session.procedure().steps[1].blocks).id;
        assert!(!session.is_visible(id));

        assert!(session.answer("name", Value::Text("Bob".to_string())));
        session.refresh(1);
        assert!(session.is_visible(id));

        assert!(session.answer("name", Value::Text("Eve".to_string())));
        session.refresh(1);
        assert!(!session.is_visible(id));
    }

    #[test]
    fn refresh_phases_run_in_order() {
        // the code block computes a value that both the interpolation and
        // the conditional in the same step depend on; a refresh must see
        // all three agree
        let mut session = session(trim(
            r#"
Q: Pick a number[n](number)
---
{
let doubled = n * 2;
}
{showif doubled == 10}
Result: {doubled}
{}
            "#,
        ));

        assert!(session.answer("n", Value::Number(5.0)));
        session.refresh(1);

        assert_eq!(
            session
                .registry()
                .get("doubled"),
            Some(&Value::Number(10.0))
        );

        let conditional = find_conditional(&session.procedure().steps[1].blocks);
        assert!(session.is_visible(conditional.id));

        let text_id = match &conditional.kind {
            BlockKind::Conditional { children, .. } => children[0].id,
            _ => unreachable!(),
        };
        assert_eq!(session.rendered_text(text_id), Some("Result: 10"));
    }

    #[test]
    fn interpolation_never_compounds() {
        let mut session = session("Q: Price?[p](number)\nCost: {p} euro");

        let text_id = session.procedure().steps[0].blocks[1].id;

        session.answer("p", Value::Number(5.0));
        session.refresh(0);
        assert_eq!(session.rendered_text(text_id), Some("Cost: 5 euro"));

        // substitution always starts from the original template, so a
        // second value replaces the first instead of finding no
        // placeholder left
        session.answer("p", Value::Number(7.0));
        session.refresh(0);
        assert_eq!(session.rendered_text(text_id), Some("Cost: 7 euro"));
    }

    #[test]
    fn empty_answers_render_as_nothing_and_unknowns_stay_literal() {
        let mut session = session("Q: City?[city]\nFrom {city}, re {mystery}");

        session.refresh(0);
        let text_id = session.procedure().steps[0].blocks[1].id;
        assert_eq!(session.rendered_text(text_id), Some("From , re {mystery}"));
    }

    #[test]
    fn code_failures_leave_the_registry_untouched() {
        let mut session = session(trim(
            r#"
{
let kept = 1;
kept = missingvar + 1;
}
            "#,
        ));

        session.refresh(0);
        assert_eq!(
            session
                .registry()
                .get("kept"),
            Some(&Value::Number(1.0))
        );
    }

    #[test]
    fn repeat_loop_until_answered() {
        let mut session = session(trim(
            r#"
Q: Add another?[more](One of: yes, no)
{RepeatStep Until more == "no"}
---
all done
            "#,
        ));

        session.refresh(0);
        assert!(!session.repeat_satisfied(0));

        session.answer("more", Value::Text("yes".to_string()));
        session.refresh(0);
        assert!(!session.repeat_satisfied(0));

        session.answer("more", Value::Text("no".to_string()));
        session.refresh(0);
        assert!(session.repeat_satisfied(0));

        // steps without a directive can always advance
        assert!(session.repeat_satisfied(1));
    }

    #[test]
    fn terminal_steps_follow_visibility() {
        let mut session = session(trim(
            r#"
Q: Done?[done](One of: yes, no)
---
{showif done == "yes"}
{end}
{}
            "#,
        ));

        session.refresh(1);
        assert!(!session.step_is_terminal(1));

        session.answer("done", Value::Text("yes".to_string()));
        session.refresh(1);
        assert!(session.step_is_terminal(1));
    }

    #[test]
    fn top_level_end_marker_is_terminal_unconditionally() {
        let mut session = session("closing words\n{end}");
        session.refresh(0);
        assert!(session.step_is_terminal(0));
    }

    #[test]
    fn nested_conditionals_only_reevaluate_under_visible_ancestors() {
        let mut session = session(trim(
            r#"
Q: Stage?[stage](number)
---
{showif stage >= 1}
{showif stage >= 2}
deep
{}
{}
            "#,
        ));

        session.answer("stage", Value::Number(2.0));
        session.refresh(1);

        let outer = find_conditional(&session.procedure().steps[1].blocks);
        let inner_id = match &outer.kind {
            BlockKind::Conditional { children, .. } => find_conditional(children).id,
            _ => unreachable!(),
        };
        let outer_id = outer.id;
        assert!(session.is_visible(outer_id));
        assert!(session.is_visible(inner_id));

        // once the ancestor hides, the nested state is left alone; it is
        // unreachable until the ancestor shows again
        session.answer("stage", Value::Number(0.0));
        session.refresh(1);
        assert!(!session.is_visible(outer_id));
        assert!(session.is_visible(inner_id));
    }

    #[test]
    fn answers_for_unknown_variables_are_dropped() {
        let mut session = session("Q: Name?[name]");

        assert!(!session.answer("ghost", Value::Text("boo".to_string())));
        assert!(session
            .registry()
            .get("ghost")
            .is_none());
    }
}
