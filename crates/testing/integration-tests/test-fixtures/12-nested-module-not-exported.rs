#[macro_use]
mod outer {
    mod inner {
        macro_rules! foo_bar { () => () }
    }
}
fn main() {
    foo_bar!();
    //^ unresolved
}
