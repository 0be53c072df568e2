#[macro_use]
mod a {
    macro_rules! foo_bar { () => () }
    //X
}
mod b {
    fn main() {
        foo_bar!();
        //^
    }
}
