macro_rules! foo_bar { () => () }
//X
foo_bar!();
//^
